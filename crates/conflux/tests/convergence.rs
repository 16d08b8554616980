//! Two trees converge after a single session, whatever their contents.

use proptest::prelude::*;

use conflux::core::ZSet;
use conflux::recon::{respond, serve, MemoryTransport, ReconConfig};
use conflux_testkit::generators::{set_pair, SetPair};
use conflux_testkit::{small_tree_config, tree_with};

/// Run one session; returns what the server and the initiator recovered.
fn reconcile(pair: &SetPair, config: &ReconConfig) -> (ZSet, ZSet) {
    let server_tree = tree_with(small_tree_config(), &pair.a());
    let client_tree = tree_with(small_tree_config(), &pair.b());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let (mut s, mut c) = MemoryTransport::pair();
        let (served, answered) = tokio::join!(
            serve(&server_tree, &mut s, config),
            respond(&client_tree, &mut c, config)
        );
        (served.unwrap().recovered, answered.unwrap())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_each_side_recovers_what_it_lacks(pair in set_pair(120)) {
        let (server_got, client_got) = reconcile(&pair, &ReconConfig::default());
        prop_assert_eq!(server_got, pair.only_b.clone());
        prop_assert_eq!(client_got, pair.only_a.clone());
    }

    #[test]
    fn test_narrow_window_converges(pair in set_pair(80), window in 1usize..4, mbar in 1usize..6) {
        let config = ReconConfig {
            mbar,
            max_outstanding_recon_requests: window,
            ..ReconConfig::default()
        };
        let (server_got, client_got) = reconcile(&pair, &config);
        prop_assert_eq!(server_got, pair.only_b.clone());
        prop_assert_eq!(client_got, pair.only_a.clone());
    }
}
