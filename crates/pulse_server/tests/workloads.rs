//! Generated multi-device workloads.

use proptest::prelude::*;
use pulse_server::{ServerConfig, SyncServer};
use pulse_testkit::{execute_steps, sync_workload_strategy, verify_log};

const DEVICES: usize = 3;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_recorded_event_is_settled_once(steps in sync_workload_strategy(DEVICES, 60)) {
        let server = SyncServer::new(ServerConfig::default());
        let mut clients = execute_steps(&steps, &server, DEVICES);

        // Flush every outbox.
        for client in &mut clients {
            client.sync(&server).unwrap();
            prop_assert!(client.outbox().is_empty());
        }

        let committed = verify_log(server.event_store().as_ref()).unwrap();
        let rejected: usize = clients.iter().map(|c| c.rejected().len()).sum();
        let recorded = steps
            .iter()
            .filter(|s| matches!(s, pulse_testkit::SyncStep::Record { .. }))
            .count();
        prop_assert_eq!(committed + rejected, recorded);
    }

    #[test]
    fn caught_up_clients_agree_on_the_log(steps in sync_workload_strategy(DEVICES, 40)) {
        let server = SyncServer::new(ServerConfig::default());
        let mut clients = execute_steps(&steps, &server, DEVICES);

        for client in &mut clients {
            client.sync(&server).unwrap();
        }
        let latest = server.latest_id().unwrap();

        for client in &mut clients {
            client.set_cursor(0);
            let response = client.sync(&server).unwrap();
            prop_assert_eq!(response.new_server_events.len() as i64, latest);
            prop_assert_eq!(client.cursor(), latest);
        }
    }
}
