// Network protocol messages

use crate::core::{Block, Transaction};
use crate::ledger::ChainSnapshot;
use crate::network::PeerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    NewBlock,
    NewTransaction,
    RequestChain,
    ChainResponse,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NewBlock => "NEW_BLOCK",
            MessageType::NewTransaction => "NEW_TRANSACTION",
            MessageType::RequestChain => "REQUEST_CHAIN",
            MessageType::ChainResponse => "CHAIN_RESPONSE",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "NEW_BLOCK" => Some(MessageType::NewBlock),
            "NEW_TRANSACTION" => Some(MessageType::NewTransaction),
            "REQUEST_CHAIN" => Some(MessageType::RequestChain),
            "CHAIN_RESPONSE" => Some(MessageType::ChainResponse),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{"type": ..., "data": ...}` as it travels on the wire
#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Network message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    NewBlock(Block),
    NewTransaction(Transaction),
    RequestChain,
    ChainResponse(ChainSnapshot),
}

impl Message {
    /// Get message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::NewBlock(_) => MessageType::NewBlock,
            Message::NewTransaction(_) => MessageType::NewTransaction,
            Message::RequestChain => MessageType::RequestChain,
            Message::ChainResponse(_) => MessageType::ChainResponse,
        }
    }

    /// Serialize to the JSON envelope
    pub fn serialize(&self) -> Result<Vec<u8>, PeerError> {
        let data = match self {
            Message::NewBlock(block) => serde_json::to_value(block)?,
            Message::NewTransaction(tx) => serde_json::to_value(tx)?,
            Message::RequestChain => Value::Null,
            Message::ChainResponse(snapshot) => serde_json::to_value(snapshot)?,
        };

        let envelope = Envelope {
            kind: self.message_type().as_str().to_string(),
            data,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Deserialize from untrusted bytes
    pub fn deserialize(data: &[u8]) -> Result<Self, PeerError> {
        let text = std::str::from_utf8(data)?;
        let envelope: Envelope = serde_json::from_str(text)?;

        let msg_type = MessageType::from_name(&envelope.kind)
            .ok_or_else(|| PeerError::UnknownType(envelope.kind.clone()))?;

        let message = match msg_type {
            MessageType::NewBlock => Message::NewBlock(serde_json::from_value(envelope.data)?),
            MessageType::NewTransaction => {
                Message::NewTransaction(serde_json::from_value(envelope.data)?)
            }
            MessageType::RequestChain => Message::RequestChain,
            MessageType::ChainResponse => {
                Message::ChainResponse(serde_json::from_value(envelope.data)?)
            }
        };
        Ok(message)
    }

    /// Key used to suppress re-processing of gossip already seen
    pub fn content_key(&self) -> Option<String> {
        match self {
            Message::NewBlock(block) => Some(format!("block:{}", block.hash)),
            Message::NewTransaction(tx) => Some(format!("tx:{}", tx.content_hash())),
            Message::RequestChain | Message::ChainResponse(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::NewBlock.as_str(), "NEW_BLOCK");
        assert_eq!(MessageType::from_name("CHAIN_RESPONSE"), Some(MessageType::ChainResponse));
        assert_eq!(MessageType::from_name("ping"), None);
    }

    #[test]
    fn test_request_chain_envelope() {
        let bytes = Message::RequestChain.serialize().unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["type"], "REQUEST_CHAIN");
        assert!(json["data"].is_null());
        assert_eq!(Message::deserialize(&bytes).unwrap(), Message::RequestChain);
    }

    #[test]
    fn test_request_chain_without_data() {
        let msg = Message::deserialize(br#"{"type":"REQUEST_CHAIN"}"#).unwrap();
        assert_eq!(msg, Message::RequestChain);
    }

    #[test]
    fn test_new_block_wire_format() {
        let block = Block::genesis(0.0);
        let bytes = Message::NewBlock(block.clone()).serialize().unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["type"], "NEW_BLOCK");
        assert_eq!(json["data"]["previousHash"], "0");
        assert_eq!(Message::deserialize(&bytes).unwrap(), Message::NewBlock(block));
    }

    #[test]
    fn test_chain_response_wire_format() {
        let snapshot = ChainSnapshot {
            chain: vec![Block::genesis(0.0)],
            pending_transactions: vec![Transaction::reward("m", 1.0, 2.0)],
        };
        let bytes = Message::ChainResponse(snapshot.clone()).serialize().unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        assert!(json["data"]["chain"].is_array());
        assert_eq!(json["data"]["pendingTransactions"][0]["from"], "network");
        assert_eq!(Message::deserialize(&bytes).unwrap(), Message::ChainResponse(snapshot));
    }

    #[test]
    fn test_malformed_messages() {
        assert!(matches!(Message::deserialize(b"not json"), Err(PeerError::Decode(_))));
        assert!(matches!(Message::deserialize(&[0xff, 0xfe]), Err(PeerError::Utf8(_))));
        assert!(matches!(
            Message::deserialize(br#"{"type":"PING","data":null}"#),
            Err(PeerError::UnknownType(t)) if t == "PING"
        ));
        assert!(matches!(
            Message::deserialize(br#"{"type":"NEW_BLOCK","data":{"index":1}}"#),
            Err(PeerError::Decode(_))
        ));
    }

    #[test]
    fn test_content_key() {
        let block = Block::genesis(0.0);
        assert_eq!(
            Message::NewBlock(block.clone()).content_key(),
            Some(format!("block:{}", block.hash))
        );
        assert_eq!(Message::RequestChain.content_key(), None);
    }
}
