//! Scenario S7 (Paxos safety): two replicas race to reserve the last seat
//! on a flight through a replicated log. At most one of them wins the seat,
//! and every replica that catches up converges on the same state.

use lsp_test_support::InMemoryCluster;
use reservation_server::{Command, CommandResult, ReservationServer};

#[tokio::test]
async fn concurrent_reservations_for_the_last_seat_converge_across_replicas() {
    let cluster: InMemoryCluster<Command> = InMemoryCluster::new(3);
    let flights = [("AC123".to_owned(), 1)];
    let servers: Vec<ReservationServer> =
        (0..cluster.len()).map(|i| ReservationServer::new(cluster.replica(i), flights.clone())).collect();

    let reserved = servers[0]
        .propose(Command::Reserve { flight: "AC123".to_owned(), user: "alice".to_owned() }, &cluster)
        .await
        .unwrap();
    assert_eq!(reserved, CommandResult::Reserved);

    let rejected = servers[1]
        .propose(Command::Reserve { flight: "AC123".to_owned(), user: "bob".to_owned() }, &cluster)
        .await;
    assert!(rejected.is_err(), "the second reservation must lose the only remaining seat");

    // A third replica, having proposed nothing of its own, still converges
    // once it catches up through the slots the first two decided.
    servers[2].catch_up(2, &cluster).await;
    let seats = servers[2].propose(Command::Query { flight: "AC123".to_owned() }, &cluster).await.unwrap();
    assert_eq!(seats, CommandResult::SeatsAvailable(0));
}
