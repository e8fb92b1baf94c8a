//! Client- and server-side events.

use crate::codec::{null_as_default, payload_bytes, WireMessage};
use serde::{Deserialize, Serialize};

/// An event created on a device, not yet globally ordered.
///
/// `client_event_id` is unique per device and is the idempotency key
/// together with the submitting device id. `created_at` is the device's
/// own clock in milliseconds and is trusted as-is by the conflict
/// arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    /// Client-generated id, unique per device.
    pub client_event_id: String,
    /// Free-form type tag.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Opaque payload.
    #[serde(with = "payload_bytes", default)]
    pub payload: Vec<u8>,
    /// Resources this event reads or writes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload_manifest: Vec<String>,
    /// Client-supplied logical timestamp (ms).
    #[serde(default)]
    pub created_at: i64,
}

impl ClientEvent {
    /// Creates an event with an empty manifest.
    pub fn new(
        client_event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
        created_at: i64,
    ) -> Self {
        Self {
            client_event_id: client_event_id.into(),
            event_type: event_type.into(),
            payload,
            payload_manifest: Vec::new(),
            created_at,
        }
    }

    /// Sets the resource manifest.
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.payload_manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the event declares no resources and so can never
    /// conflict.
    pub fn is_untracked(&self) -> bool {
        self.payload_manifest.is_empty()
    }
}

/// The durable, globally ordered record of an admitted [`ClientEvent`].
///
/// Immutable once returned by the event store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Strictly increasing id, also the sync cursor value.
    pub server_event_id: i64,
    /// `client_event_id` of the originating event.
    pub origin_client_event_id: String,
    /// Device that submitted the originating event.
    pub origin_client_device_id: String,
    /// Payload copied verbatim.
    #[serde(with = "payload_bytes", default)]
    pub payload: Vec<u8>,
    /// Manifest copied verbatim.
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload_manifest: Vec<String>,
    /// Client timestamp copied verbatim (not server receipt time).
    #[serde(default)]
    pub created_at: i64,
}

impl ServerEvent {
    /// Builds the stored record for `event` submitted by `device_id`.
    pub fn from_client(server_event_id: i64, device_id: &str, event: &ClientEvent) -> Self {
        Self {
            server_event_id,
            origin_client_event_id: event.client_event_id.clone(),
            origin_client_device_id: device_id.to_string(),
            payload: event.payload.clone(),
            payload_manifest: event.payload_manifest.clone(),
            created_at: event.created_at,
        }
    }
}

impl WireMessage for ClientEvent {}
impl WireMessage for ServerEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_event_copies_client_fields() {
        let client = ClientEvent::new("ce-1", "note.edit", b"data".to_vec(), 42)
            .with_manifest(["note:1", "tag:a"]);

        let server = ServerEvent::from_client(7, "dev-1", &client);

        assert_eq!(server.server_event_id, 7);
        assert_eq!(server.origin_client_event_id, "ce-1");
        assert_eq!(server.origin_client_device_id, "dev-1");
        assert_eq!(server.payload, b"data");
        assert_eq!(server.payload_manifest, vec!["note:1", "tag:a"]);
        assert_eq!(server.created_at, 42);
    }

    #[test]
    fn json_uses_camel_case_and_base64() {
        let event = ClientEvent::new("ce-1", "t", b"hi".to_vec(), 5).with_manifest(["r"]);
        let json: serde_json::Value =
            serde_json::from_slice(&event.encode_json().unwrap()).unwrap();

        assert_eq!(json["clientEventId"], "ce-1");
        assert_eq!(json["type"], "t");
        assert_eq!(json["payload"], "aGk=");
        assert_eq!(json["payloadManifest"][0], "r");
        assert_eq!(json["createdAt"], 5);
    }

    #[test]
    fn absent_or_null_manifest_is_empty() {
        let absent = ClientEvent::decode_json(br#"{"clientEventId":"a","payload":""}"#).unwrap();
        assert!(absent.is_untracked());

        let null = ClientEvent::decode_json(
            br#"{"clientEventId":"b","type":"x","payload":"","payloadManifest":null,"createdAt":1}"#,
        )
        .unwrap();
        assert!(null.is_untracked());
        assert_eq!(null.created_at, 1);
    }

    #[test]
    fn payload_accepts_byte_array() {
        let event =
            ClientEvent::decode_json(br#"{"clientEventId":"a","payload":[1,2,3]}"#).unwrap();
        assert_eq!(event.payload, vec![1, 2, 3]);
    }

    #[test]
    fn cbor_keeps_payload_as_bytes() {
        let event = ServerEvent::from_client(
            1,
            "dev",
            &ClientEvent::new("ce", "t", vec![0, 255, 7], 9).with_manifest(["r"]),
        );

        let bytes = event.encode_cbor().unwrap();
        assert_eq!(ServerEvent::decode_cbor(&bytes).unwrap(), event);
    }
}
