use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::decode_reply;
use crate::actor::encode_reply;
use crate::actor::Actor;
use crate::actor::ActorId;
use crate::actor::ActorSystem;
use crate::actor::Error;
use crate::actor::Invocation;
use crate::actor::RequestContext;
use crate::actor::Result;

/// A test actor with a handful of invocable methods, including one that
/// calls back into the actor it was moved near to.
pub(crate) struct Person {
  id: ActorId,
  name: String,
  system: ActorSystem,
  friend: Mutex<Option<ActorId>>,
}

impl Person {
  pub(crate) fn new(system: &ActorSystem, id: ActorId, name: impl Into<String>) -> Person {
    Person {
      id,
      name: name.into(),
      system: system.clone(),
      friend: Mutex::new(None),
    }
  }

  pub(crate) fn spawn(system: &ActorSystem, name: &str) -> Arc<Person> {
    system.make_local_actor(None, |id| Person::new(system, id, name))
  }
}

#[async_trait]
impl Actor for Person {
  fn id(&self) -> &ActorId {
    &self.id
  }

  async fn handle(&self, request: RequestContext) -> Result<Vec<u8>> {
    let invocation = &request.invocation;
    match invocation.target() {
      "Person.addOne" => {
        let n: u64 = invocation.arg(0)?;
        encode_reply(&(n + 1))
      }
      "Person.moveNear" => {
        let friend: ActorId = invocation.arg(0)?;
        *self.friend.lock().unwrap() = Some(friend);
        Ok(Vec::new())
      }
      "Person.introduceYourself" => {
        let friend = self
          .friend
          .lock()
          .unwrap()
          .clone()
          .ok_or_else(|| Error::UnexpectedInvocationTarget("Person.introduceYourself".to_owned()))?;
        let greet = Invocation::new("Person.greet").with_arg(&self.name)?;
        let reply = self.system.remote_call(&friend, greet).await?;
        let greeting: String = decode_reply(&reply)?;
        encode_reply(&greeting)
      }
      "Person.greet" => {
        let name: String = invocation.arg(0)?;
        encode_reply(&format!("Nice to meet you, {name}."))
      }
      "Person.countVisit" => {
        let visits = self.system.get_node_info::<u64>("visits")?.map(|count| *count).unwrap_or(0) + 1;
        self.system.set_node_info("visits", visits)?;
        encode_reply(&visits)
      }
      "Person.nap" => {
        let millis: u64 = invocation.arg(0)?;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Vec::new())
      }
      other => Err(Error::UnexpectedInvocationTarget(other.to_owned())),
    }
  }
}
