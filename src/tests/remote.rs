use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::actor::decode_reply;
use crate::actor::Actor;
use crate::actor::ActorId;
use crate::actor::Error;
use crate::actor::Invocation;
use crate::actor::NodeId;
use crate::actor::SystemBuilder;
use crate::tests::default_client_system;
use crate::tests::default_server_system;
use crate::tests::person::Person;
use crate::tests::try_init_logger;
use crate::tests::wait_until;
use crate::ClientMonitor;
use crate::ClientStatus;
use crate::Manager;
use crate::ServerAddress;

#[tokio::test]
async fn test_remote_call_end_to_end() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let alice = Person::spawn(&server, "Alice");

  let client = default_client_system(manager.local_addr().port());

  let invocation = Invocation::new("Person.addOne").with_arg(&42u64).unwrap();
  let reply = client.remote_call(alice.id(), invocation).await.unwrap();
  assert_eq!(decode_reply::<u64>(&reply).unwrap(), 43);

  // Addressing the same token stamped with the server's node id reaches
  // the same instance.
  let readdressed = ActorId::new(alice.id().id()).with_node(server.node_id());
  let invocation = Invocation::new("Person.addOne").with_arg(&7u64).unwrap();
  let reply = client.remote_call(&readdressed, invocation).await.unwrap();
  assert_eq!(decode_reply::<u64>(&reply).unwrap(), 8);

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;
}

#[tokio::test]
async fn test_concurrent_calls_correlate_replies() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let alice = Person::spawn(&server, "Alice");

  let client = default_client_system(manager.local_addr().port());

  let mut calls = Vec::new();
  for n in 0..16u64 {
    let client = client.clone();
    let id = alice.id().clone();
    let invocation = Invocation::new("Person.addOne").with_arg(&n).unwrap();
    calls.push(tokio::spawn(async move { (n, client.remote_call(&id, invocation).await) }));
  }

  for call in calls {
    let (n, reply) = call.await.unwrap();
    assert_eq!(decode_reply::<u64>(&reply.unwrap()).unwrap(), n + 1);
  }

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;
}

/// A server-hosted actor can call back to an actor hosted on a client-only
/// node: the client is reached by node id over its own inbound connection.
#[tokio::test]
async fn test_server_calls_back_through_the_client_connection() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let dave = Person::spawn(&server, "Dave");

  let client = default_client_system(manager.local_addr().port());
  let carol = Person::spawn(&client, "Carol");

  let move_near = Invocation::new("Person.moveNear").with_arg(carol.id()).unwrap();
  client.remote_call_void(dave.id(), move_near).await.unwrap();

  let reply = client
    .remote_call(dave.id(), Invocation::new("Person.introduceYourself"))
    .await
    .unwrap();
  assert_eq!(decode_reply::<String>(&reply).unwrap(), "Nice to meet you, Dave.");

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;
}

#[tokio::test]
async fn test_call_to_a_never_seen_node_times_out() {
  try_init_logger();

  let system = SystemBuilder::new()
    .connection_timeout(Duration::from_millis(100))
    .build();
  let stranger = ActorId::random().with_node(NodeId::random());

  let started = tokio::time::Instant::now();
  let result = system.remote_call(&stranger, Invocation::new("Person.addOne")).await;

  assert!(matches!(result, Err(Error::TimeoutWaitingForNodeId { .. })));
  assert!(started.elapsed() >= Duration::from_millis(100));
}

/// A call to an unknown recipient is dropped by the serving node without a
/// reply; the caller observes it through its own timeout.
#[tokio::test]
async fn test_call_to_an_unknown_recipient_gets_no_reply() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let client = default_client_system(manager.local_addr().port());

  let nobody = ActorId::new("nobody").with_node(server.node_id());
  let call = client.remote_call(&nobody, Invocation::new("Person.addOne"));
  let result = tokio::time::timeout(Duration::from_millis(300), call).await;
  assert!(result.is_err());

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;
}

/// Handler errors cross the wire as an empty reply value, surfacing to the
/// caller as a local decoding failure.
#[tokio::test]
async fn test_handler_errors_surface_as_decoding_failures() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let alice = Person::spawn(&server, "Alice");

  let client = default_client_system(manager.local_addr().port());

  let reply = client
    .remote_call(alice.id(), Invocation::new("Person.noSuchMethod"))
    .await
    .unwrap();
  assert!(reply.is_empty());
  assert!(matches!(decode_reply::<String>(&reply), Err(Error::DecodingFailure(_))));

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;
}

#[tokio::test]
async fn test_node_info_is_scoped_to_the_calling_connection() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let alice = Person::spawn(&server, "Alice");

  let client = default_client_system(manager.local_addr().port());

  for expected in 1..=3u64 {
    let reply = client
      .remote_call(alice.id(), Invocation::new("Person.countVisit"))
      .await
      .unwrap();
    assert_eq!(decode_reply::<u64>(&reply).unwrap(), expected);
  }

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;
}

#[tokio::test]
async fn test_pending_calls_fail_when_the_connection_closes() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let alice = Person::spawn(&server, "Alice");

  let client = default_client_system(manager.local_addr().port());

  let nap = Invocation::new("Person.nap").with_arg(&2_000u64).unwrap();
  let alice_id = alice.id().clone();
  let sleeper = {
    let client = client.clone();
    tokio::spawn(async move { client.remote_call(&alice_id, nap).await })
  };

  // Let the call reach the server, then tear the server down mid-handler.
  tokio::time::sleep(Duration::from_millis(200)).await;
  server.shutdown_gracefully().await;

  let outcome = tokio::time::timeout(Duration::from_secs(2), sleeper).await;
  assert!(matches!(outcome, Ok(Ok(Err(Error::ConnectionLost)))));

  client.shutdown_gracefully().await;
}

#[tokio::test]
async fn test_reconnect_observes_transitions_and_completes_queued_calls() {
  try_init_logger();

  let server = SystemBuilder::new().build();
  let first_manager = server
    .run_server(ServerAddress::insecure("127.0.0.1", 0))
    .await
    .unwrap();
  let port = first_manager.local_addr().port();
  let alice = Person::spawn(&server, "Alice");

  let statuses: Arc<Mutex<Vec<ClientStatus>>> = Arc::new(Mutex::new(Vec::new()));
  let monitor: ClientMonitor = {
    let statuses = Arc::clone(&statuses);
    Arc::new(move |status| statuses.lock().unwrap().push(status))
  };

  let client = SystemBuilder::new()
    .connection_timeout(Duration::from_secs(5))
    .reconnect_delays(Duration::from_millis(50), Duration::from_millis(200))
    .build();
  client.connect_client_with_monitor(ServerAddress::insecure("127.0.0.1", port), Some(monitor));

  let saw = |status: ClientStatus, statuses: &Arc<Mutex<Vec<ClientStatus>>>| {
    statuses.lock().unwrap().contains(&status)
  };
  assert!(wait_until(|| saw(ClientStatus::Connected, &statuses), Duration::from_secs(5)).await);

  // Cycle the server: cancel the listener, submit a call during the
  // outage, then bring the listener back on the same port.
  first_manager.cancel().await;
  assert!(wait_until(|| saw(ClientStatus::Disconnected, &statuses), Duration::from_secs(5)).await);
  assert!(wait_until(|| saw(ClientStatus::Reconnecting, &statuses), Duration::from_secs(5)).await);

  let queued = {
    let client = client.clone();
    let alice_id = alice.id().clone();
    let invocation = Invocation::new("Person.addOne").with_arg(&41u64).unwrap();
    tokio::spawn(async move { client.remote_call(&alice_id, invocation).await })
  };

  let _second_manager = server
    .run_server(ServerAddress::insecure("127.0.0.1", port))
    .await
    .unwrap();

  let reply = queued.await.unwrap().unwrap();
  assert_eq!(decode_reply::<u64>(&reply).unwrap(), 42);

  {
    let statuses = statuses.lock().unwrap();
    let of_interest: Vec<ClientStatus> = statuses
      .iter()
      .copied()
      .filter(|status| {
        matches!(
          status,
          ClientStatus::Connected | ClientStatus::Disconnected | ClientStatus::Reconnecting
        )
      })
      .collect();
    assert!(of_interest.starts_with(&[ClientStatus::Connected, ClientStatus::Disconnected, ClientStatus::Reconnecting]));
    assert_eq!(of_interest.iter().filter(|status| **status == ClientStatus::Connected).count(), 2);
  }

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;

  let final_statuses = statuses.lock().unwrap();
  assert_eq!(final_statuses.last(), Some(&ClientStatus::Cancelled));
}

#[tokio::test]
async fn test_running_a_secure_server_is_rejected() {
  let system = SystemBuilder::new().build();

  let result = system.run_server(ServerAddress::secure("127.0.0.1", 0)).await;
  assert!(matches!(result, Err(Error::SecureServerNotSupported)));
}

#[tokio::test]
async fn test_shutdown_waits_for_managers() {
  try_init_logger();

  let (server, manager) = default_server_system().await;
  let port = manager.local_addr().port();
  let client = default_client_system(port);

  client.shutdown_gracefully().await;
  server.shutdown_gracefully().await;

  // Both listeners are gone: a fresh bind on the same port succeeds.
  let replacement = SystemBuilder::new().build();
  let rebound = replacement
    .run_server(ServerAddress::insecure("127.0.0.1", port))
    .await
    .unwrap();
  assert_eq!(rebound.local_addr().port(), port);
  replacement.shutdown_gracefully().await;
}
