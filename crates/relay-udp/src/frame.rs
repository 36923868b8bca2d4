//! Datagram frame grammar
//!
//! Data frames are `SEQID:PAYLOAD` with the payload escaped by the shared
//! `\` / `:` rules; control frames are `ACK:SEQID`, `REGISTER` and `PING`.
//! Anything else is an unframed payload delivered without reliability.

use relay_core::wire::{escape, unescape};

// ----------------------------------------------------------------------------
// Datagram Frame
// ----------------------------------------------------------------------------

/// One parsed datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramFrame {
    /// Sequenced data frame; must be acknowledged by the receiver
    Data { seq: u64, payload: String },
    /// Acknowledgment of a previously sent data frame
    Ack { seq: u64 },
    /// Peer registration / refresh
    Register,
    /// Heartbeat; refreshes last-activity, needs no reply
    Ping,
    /// Payload with no sequence id; delivered as-is, never acknowledged
    Raw { payload: String },
}

impl DatagramFrame {
    /// Build a data frame
    pub fn data<P: Into<String>>(seq: u64, payload: P) -> Self {
        DatagramFrame::Data {
            seq,
            payload: payload.into(),
        }
    }

    /// Serialize to the datagram wire form
    pub fn encode(&self) -> String {
        match self {
            DatagramFrame::Data { seq, payload } => format!("{seq}:{}", escape(payload)),
            DatagramFrame::Ack { seq } => format!("ACK:{seq}"),
            DatagramFrame::Register => "REGISTER".to_string(),
            DatagramFrame::Ping => "PING".to_string(),
            DatagramFrame::Raw { payload } => escape(payload),
        }
    }

    /// Parse one received datagram.
    ///
    /// Parsing is total: a frame that matches no recognized shape falls back
    /// to [`DatagramFrame::Raw`], mirroring the tolerant receive path of the
    /// datagram protocol (an unparsable ACK id is also treated as raw).
    pub fn decode(raw: &str) -> Self {
        if raw == "REGISTER" {
            return DatagramFrame::Register;
        }
        if raw == "PING" {
            return DatagramFrame::Ping;
        }
        if let Some(id) = raw.strip_prefix("ACK:") {
            if let Ok(seq) = id.trim().parse::<u64>() {
                return DatagramFrame::Ack { seq };
            }
            return DatagramFrame::Raw {
                payload: unescape(raw),
            };
        }
        if let Some((head, tail)) = raw.split_once(':') {
            if let Ok(seq) = head.parse::<u64>() {
                return DatagramFrame::Data {
                    seq,
                    payload: unescape(tail),
                };
            }
        }
        DatagramFrame::Raw {
            payload: unescape(raw),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_round_trips() {
        let frame = DatagramFrame::data(7, "hello world");
        assert_eq!(frame.encode(), "7:hello world");
        assert_eq!(DatagramFrame::decode("7:hello world"), frame);
    }

    #[test]
    fn payload_colons_are_escaped() {
        let frame = DatagramFrame::data(0, "REQUEST:r1:REGISTER:alice");
        assert_eq!(frame.encode(), "0:REQUEST\\:r1\\:REGISTER\\:alice");
        assert_eq!(DatagramFrame::decode(&frame.encode()), frame);
    }

    #[test]
    fn control_frames() {
        assert_eq!(DatagramFrame::decode("REGISTER"), DatagramFrame::Register);
        assert_eq!(DatagramFrame::decode("PING"), DatagramFrame::Ping);
        assert_eq!(DatagramFrame::decode("ACK:12"), DatagramFrame::Ack { seq: 12 });
        assert_eq!(DatagramFrame::Ack { seq: 12 }.encode(), "ACK:12");
    }

    #[test]
    fn unrecognized_payload_falls_back_to_raw() {
        assert_eq!(
            DatagramFrame::decode("hello"),
            DatagramFrame::Raw {
                payload: "hello".to_string()
            }
        );
        assert_eq!(
            DatagramFrame::decode("ACK:not-a-number"),
            DatagramFrame::Raw {
                payload: "ACK:not-a-number".to_string()
            }
        );
        assert_eq!(
            DatagramFrame::decode("xyz:payload"),
            DatagramFrame::Raw {
                payload: "xyz:payload".to_string()
            }
        );
    }
}
