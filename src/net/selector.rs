//! Endpoint ordering for connection attempts.
//!
//! Resolved endpoints are tried in a uniformly random order so load spreads
//! across every address a name resolves to.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::net::resolver::Endpoint;

/// Permute `endpoints` with the thread-local RNG.
pub fn shuffle(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    shuffle_with(endpoints, &mut rand::thread_rng())
}

/// Permute `endpoints` with a caller-supplied RNG.
pub fn shuffle_with<R: Rng + ?Sized>(mut endpoints: Vec<Endpoint>, rng: &mut R) -> Vec<Endpoint> {
    endpoints.shuffle(rng);
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn endpoints(count: u16) -> Vec<Endpoint> {
        (1..=count)
            .map(|port| Endpoint::new(([127, 0, 0, 1], port).into()))
            .collect()
    }

    #[test]
    fn permutation_keeps_every_endpoint() {
        let mut shuffled = shuffle(endpoints(8));
        shuffled.sort_by_key(|endpoint| endpoint.addr().port());
        assert_eq!(shuffled, endpoints(8));
    }

    #[test]
    fn first_choice_is_not_biased() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut firsts: HashMap<u16, u32> = HashMap::new();
        for _ in 0..4000 {
            let order = shuffle_with(endpoints(4), &mut rng);
            *firsts.entry(order[0].addr().port()).or_default() += 1;
        }
        assert_eq!(firsts.len(), 4);
        for (port, count) in firsts {
            assert!((800..1200).contains(&count), "port {port} first {count} times");
        }
    }

    #[test]
    fn single_and_empty_lists() {
        assert_eq!(shuffle(endpoints(1)), endpoints(1));
        assert!(shuffle(Vec::new()).is_empty());
    }
}
