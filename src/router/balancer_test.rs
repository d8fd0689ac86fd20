use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::actor::core_types::ChildOptions;
use crate::behavior::{BehaviorDef, Handlers};
use crate::error::ActorError;
use crate::router::balancer::BalancerRegistry;
use crate::system::{ActorSystem, SystemConfig};

#[test]
fn unknown_balancer_names_are_invalid_configuration() {
  let registry = BalancerRegistry::with_builtins(None);
  assert!(registry.create("roundrobin").is_ok());
  assert!(registry.create("random").is_ok());
  let error = registry.create("fancy").unwrap_err();
  assert!(matches!(error, ActorError::InvalidConfig(_)));
}

fn counting_def(name: &'static str) -> BehaviorDef {
  BehaviorDef::local(name, move || {
    let hits = Arc::new(AtomicU64::new(0));
    Handlers::new(name).on("tally", move |_payload: Value, ctx| {
      let hits = hits.clone();
      async move {
        let total = hits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "id": ctx.id().to_string(), "total": total }))
      }
    })
  })
}

#[tokio::test]
async fn round_robin_splits_deliveries_evenly() {
  let system = ActorSystem::new(SystemConfig::default().with_test(true)).await.unwrap();
  let cluster = system
    .root_actor()
    .create_child(counting_def("Even"), ChildOptions::default().with_cluster_size(3))
    .await
    .unwrap();

  let mut per_replica: HashMap<String, u64> = HashMap::new();
  for _ in 0..10 {
    let reply = cluster.send_and_receive("tally", Value::Null).await.unwrap();
    *per_replica.entry(reply["id"].as_str().unwrap().to_string()).or_default() += 1;
  }
  // 10 deliveries over 3 replicas: every replica gets ceil or floor of 10/3.
  assert_eq!(per_replica.len(), 3);
  let mut counts: Vec<u64> = per_replica.values().copied().collect();
  counts.sort_unstable();
  assert_eq!(counts, vec![3, 3, 4]);
  system.destroy().await.unwrap();
}

#[tokio::test]
async fn random_selection_reaches_every_replica_roughly_uniformly() {
  let system = ActorSystem::new(SystemConfig::default().with_test(true)).await.unwrap();
  let cluster = system
    .root_actor()
    .create_child(
      counting_def("Spread"),
      ChildOptions::default().with_cluster_size(2).with_balancer("random"),
    )
    .await
    .unwrap();

  let mut per_replica: HashMap<String, i64> = HashMap::new();
  for _ in 0..100 {
    let reply = cluster.send_and_receive("tally", Value::Null).await.unwrap();
    *per_replica.entry(reply["id"].as_str().unwrap().to_string()).or_default() += 1;
  }
  assert_eq!(per_replica.len(), 2);
  let counts: Vec<i64> = per_replica.values().copied().collect();
  let delta = (counts[0] - counts[1]).abs();
  // Uniformity is the contract; the bound is a loose smoke test.
  assert!(counts.iter().all(|count| *count >= 10), "counts {:?} far from uniform", counts);
  assert!(delta <= 80, "delta {} far from uniform", delta);
  system.destroy().await.unwrap();
}
