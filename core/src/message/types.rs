// Envelope types: the unit everything on the bus is wrapped in

use crate::network::NetworkPeer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Embedded message of an envelope.
///
/// Carries an optional body plus any error annotations added while the
/// envelope travelled through a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Arbitrary body (the discovery task puts its peer list here)
    pub body: Option<Value>,
    /// Error annotations, oldest first
    pub errors: Vec<String>,
}

impl Message {
    /// Append an error annotation
    pub fn add_error_message(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Route that leaves this process for a peer on some network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRoute {
    /// Service that handles the envelope on the far side
    pub service: String,
    /// Operation requested of that service
    pub operation: String,
    /// Sending peer
    pub origination: Option<NetworkPeer>,
    /// Receiving peer
    pub destination: Option<NetworkPeer>,
}

/// Where an envelope is headed and what it asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Route {
    /// Stays on the local bus
    Internal { service: String, operation: String },
    /// Goes out over the network
    External(ExternalRoute),
}

impl Route {
    /// Operation name carried by the route
    pub fn operation(&self) -> &str {
        match self {
            Route::Internal { operation, .. } => operation,
            Route::External(er) => &er.operation,
        }
    }

    /// Service name carried by the route
    pub fn service(&self) -> &str {
        match self {
            Route::Internal { service, .. } => service,
            Route::External(er) => &er.service,
        }
    }

    pub fn as_external(&self) -> Option<&ExternalRoute> {
        match self {
            Route::External(er) => Some(er),
            Route::Internal { .. } => None,
        }
    }
}

/// A routed message unit.
///
/// Inbound operation requests and outbound network packets are both envelopes.
/// Handlers write their results back as name-value pairs in `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope ID (UUID v4)
    pub id: String,
    /// Route (operation and, for external routes, the peers)
    pub route: Route,
    /// Name-value pairs
    pub content: BTreeMap<String, Value>,
    /// Embedded message with error annotations
    pub message: Message,
    /// Labels applied along the way (e.g. `NetOpReq`)
    pub markers: Vec<String>,
}

impl Envelope {
    /// Create an empty document envelope with a fresh ID and an internal route
    /// that asks for nothing yet.
    pub fn document() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            route: Route::Internal {
                service: String::new(),
                operation: String::new(),
            },
            content: BTreeMap::new(),
            message: Message::default(),
            markers: Vec::new(),
        }
    }

    /// Create a document envelope routed to a local service operation
    pub fn for_operation(service: &str, operation: &str) -> Self {
        let mut envelope = Self::document();
        envelope.add_route(service, operation);
        envelope
    }

    /// Replace the route with an internal one
    pub fn add_route(&mut self, service: &str, operation: &str) {
        self.route = Route::Internal {
            service: service.to_string(),
            operation: operation.to_string(),
        };
    }

    /// Replace the route with an external one between two peers
    pub fn add_external_route(
        &mut self,
        service: &str,
        operation: &str,
        origination: Option<NetworkPeer>,
        destination: Option<NetworkPeer>,
    ) {
        self.route = Route::External(ExternalRoute {
            service: service.to_string(),
            operation: operation.to_string(),
            origination,
            destination,
        });
    }

    /// Operation requested by this envelope
    pub fn operation(&self) -> &str {
        self.route.operation()
    }

    /// Add (or overwrite) a name-value pair
    pub fn add_nvp(&mut self, name: &str, value: impl Into<Value>) {
        self.content.insert(name.to_string(), value.into());
    }

    /// Raw value of a name-value pair
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.content.get(name)
    }

    /// String value of a name-value pair; non-string values read as absent
    pub fn value_str(&self, name: &str) -> Option<&str> {
        self.content.get(name).and_then(Value::as_str)
    }

    /// Typed value of a name-value pair. A value that does not decode as `T`
    /// reads as absent.
    pub fn value_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.content
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set the message body
    pub fn add_content<T: Serialize>(&mut self, body: &T) -> Result<(), serde_json::Error> {
        self.message.body = Some(serde_json::to_value(body)?);
        Ok(())
    }

    /// Label the envelope
    pub fn mark(&mut self, marker: &str) {
        self.markers.push(marker.to_string());
    }

    pub fn is_marked(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m == marker)
    }

    /// First seven characters of the ID, for log lines
    pub fn short_id(&self) -> &str {
        self.id.get(..7).unwrap_or(&self.id)
    }
}
