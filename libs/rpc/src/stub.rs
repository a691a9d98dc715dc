use serde_json::Value;

use crate::client::Client;
use crate::error::Result;
use crate::key::FunctionKey;

/// A local forwarding callable bound to one remote function.
///
/// Built once via [`Client::bind`]; the key is computed at bind time and
/// every invocation just issues `client.call(key, args)`. Call sites read
/// like ordinary local calls:
///
/// ```no_run
/// # use tether_rpc::{Client, FunctionKey};
/// # use serde_json::json;
/// # async fn example(client: Client) -> tether_rpc::Result<()> {
/// let remote_add = client.bind(FunctionKey::new(["Demo"], "add"));
/// let sum = remote_add.invoke(vec![json!(10), json!(20)]).await?;
/// assert_eq!(sum, json!(30));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemoteFn {
    client: Client,
    key: FunctionKey,
}

impl RemoteFn {
    pub(crate) fn new(client: Client, key: FunctionKey) -> Self {
        Self { client, key }
    }

    /// The key this stub forwards to.
    pub fn key(&self) -> &FunctionKey {
        &self.key
    }

    /// Invoke the remote function with positional arguments.
    pub async fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        self.client.call(&self.key, args).await
    }
}
