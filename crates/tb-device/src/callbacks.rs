//! RPC and attribute callback registry.

use tb_protocol::KeyValue;

use crate::error::{ClientError, ClientResult};

/// Maximum number of RPC handlers a client holds.
pub const CALLBACK_CAPACITY: usize = 8;

/// RPC handler: receives resolved params, returns an optional reply.
pub type RpcHandler = Box<dyn FnMut(&serde_json::Value) -> KeyValue>;

/// Attribute handler: receives the unwrapped attribute object.
pub type AttributeHandler = Box<dyn FnMut(&serde_json::Map<String, serde_json::Value>)>;

struct RpcEntry {
    method: String,
    handler: RpcHandler,
}

/// Callbacks handed to `DeviceClient::subscribe`.
///
/// ```ignore
/// let callbacks = Callbacks::new()
///     .rpc("reboot", |_| KeyValue::new("reboot", 1))
///     .on_attributes(|attrs| println!("{attrs:?}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    rpc: Vec<RpcEntry>,
    attributes: Option<AttributeHandler>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an RPC method. Registration order is kept.
    pub fn rpc<F>(mut self, method: &str, handler: F) -> Self
    where
        F: FnMut(&serde_json::Value) -> KeyValue + 'static,
    {
        self.rpc.push(RpcEntry {
            method: method.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    /// Set the single attribute handler (a later call replaces it).
    pub fn on_attributes<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&serde_json::Map<String, serde_json::Value>) + 'static,
    {
        self.attributes = Some(Box::new(handler));
        self
    }

    pub fn rpc_count(&self) -> usize {
        self.rpc.len()
    }
}

/// Installed callbacks. Only ever replaced as a whole.
#[derive(Default)]
pub(crate) struct CallbackTable {
    rpc: Vec<RpcEntry>,
    attributes: Option<AttributeHandler>,
}

impl CallbackTable {
    pub(crate) fn install(callbacks: Callbacks) -> ClientResult<Self> {
        if callbacks.rpc.len() > CALLBACK_CAPACITY {
            return Err(ClientError::TableFull {
                requested: callbacks.rpc.len(),
                capacity: CALLBACK_CAPACITY,
            });
        }
        Ok(Self {
            rpc: callbacks.rpc,
            attributes: callbacks.attributes,
        })
    }

    /// First handler registered for `method`.
    pub(crate) fn rpc_handler(&mut self, method: &str) -> Option<&mut RpcHandler> {
        self.rpc
            .iter_mut()
            .find(|entry| entry.method == method)
            .map(|entry| &mut entry.handler)
    }

    pub(crate) fn attribute_handler(&mut self) -> Option<&mut AttributeHandler> {
        self.attributes.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.rpc.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_registration_wins() {
        let callbacks = Callbacks::new()
            .rpc("ping", |_| KeyValue::new("ping", 1))
            .rpc("ping", |_| KeyValue::new("ping", 2));
        let mut table = CallbackTable::install(callbacks).unwrap();

        let handler = table.rpc_handler("ping").unwrap();
        assert_eq!(handler(&json!(null)), KeyValue::new("ping", 1));
    }

    #[test]
    fn unknown_method_has_no_handler() {
        let mut table =
            CallbackTable::install(Callbacks::new().rpc("a", |_| KeyValue::new("ok", 1))).unwrap();
        assert!(table.rpc_handler("b").is_none());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut callbacks = Callbacks::new();
        for i in 0..=CALLBACK_CAPACITY {
            callbacks = callbacks.rpc(&format!("m{i}"), |_| KeyValue::new("ok", 1));
        }
        let err = CallbackTable::install(callbacks).err().unwrap();
        assert!(matches!(
            err,
            ClientError::TableFull {
                requested: 9,
                capacity: 8
            }
        ));
    }

    #[test]
    fn exactly_full_table_is_accepted() {
        let mut callbacks = Callbacks::new();
        for i in 0..CALLBACK_CAPACITY {
            callbacks = callbacks.rpc(&format!("m{i}"), |_| KeyValue::new("ok", 1));
        }
        assert_eq!(CallbackTable::install(callbacks).unwrap().len(), 8);
    }

    #[test]
    fn attribute_handler_is_optional() {
        let mut table = CallbackTable::install(Callbacks::new()).unwrap();
        assert!(table.attribute_handler().is_none());

        let mut table =
            CallbackTable::install(Callbacks::new().on_attributes(|_| {})).unwrap();
        assert!(table.attribute_handler().is_some());
    }
}
