//! End-to-end tests: the delegation controller driving a simulated cluster


use std::{sync::Arc, time::Duration};

use er_client::{DelegationController, KeypairWallet, RouterConfig};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};

use crate::SimulatedCluster;

/// Router settings scaled down for in-memory ledgers
fn fast_config() -> RouterConfig {
    RouterConfig {
        confirm_timeout: Duration::from_secs(2),
        settlement_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

struct Harness {
    cluster: SimulatedCluster,
    controller: DelegationController,
    address: Pubkey,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(fast_config())
    }

    fn with_config(config: RouterConfig) -> Self {
        let cluster = SimulatedCluster::default();
        let controller = DelegationController::new(
            cluster.ledgers(),
            Arc::new(KeypairWallet::new(Keypair::new())),
            cluster.program(),
            config,
        );
        let address = controller.counter_address();
        Self {
            cluster,
            controller,
            address,
        }
    }

    /// Initialize, increment `base_increments` times, then delegate
    async fn delegated_with(base_increments: u32) -> Self {
        let harness = Self::new();
        harness.controller.initialize(&harness.address).await.unwrap();
        for _ in 0..base_increments {
            harness.controller.increment(&harness.address).await.unwrap();
        }
        harness.controller.delegate(&harness.address).await.unwrap();
        harness
    }
}
