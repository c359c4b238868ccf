use std::io::{Read, Write};

use crate::packet::{
    AnswerPayload, CoordinatorAnnouncePayload, CoordinatorPayload, DisconnectPayload,
    ElectionPayload, LoginPayload, MessagePayload, Packet, PacketType, ReplAckPayload,
    ReplEventPayload, StateSnapshotPayload,
};
use crate::{WireError, FRAME_HEADER_SIZE, PACKET_MAX};

fn encode_payload(packet: &Packet) -> Result<Vec<u8>, WireError> {
    let encode = |v: &_| postcard::to_allocvec(v).map_err(|e| WireError::DecodeError(e.to_string()));
    match packet {
        Packet::Login(p) => encode(p),
        Packet::Logout | Packet::KeepAlive => Ok(Vec::new()),
        Packet::Message(p) | Packet::ServerBroadcast(p) => encode(p),
        Packet::Disconnect(p) => encode(p),
        Packet::ReplEvent(p) => encode(p),
        Packet::ReplAck(p) => encode(p),
        Packet::Election(p) => encode(p),
        Packet::Answer(p) => encode(p),
        Packet::Coordinator(p) => encode(p),
        Packet::StateSnapshot(p) => encode(p),
        Packet::CoordinatorAnnounce(p) => encode(p),
    }
}

fn decode_payload(ty: PacketType, bytes: &[u8]) -> Result<Packet, WireError> {
    let decode_err = |e: postcard::Error| WireError::DecodeError(e.to_string());
    Ok(match ty {
        PacketType::Login => Packet::Login(postcard::from_bytes::<LoginPayload>(bytes).map_err(decode_err)?),
        PacketType::Logout => Packet::Logout,
        PacketType::Message => {
            Packet::Message(postcard::from_bytes::<MessagePayload>(bytes).map_err(decode_err)?)
        }
        PacketType::ServerBroadcast => {
            Packet::ServerBroadcast(postcard::from_bytes::<MessagePayload>(bytes).map_err(decode_err)?)
        }
        PacketType::KeepAlive => Packet::KeepAlive,
        PacketType::Disconnect => {
            Packet::Disconnect(postcard::from_bytes::<DisconnectPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::ReplEvent => {
            Packet::ReplEvent(postcard::from_bytes::<ReplEventPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::ReplAck => {
            Packet::ReplAck(postcard::from_bytes::<ReplAckPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::Election => {
            Packet::Election(postcard::from_bytes::<ElectionPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::Answer => {
            Packet::Answer(postcard::from_bytes::<AnswerPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::Coordinator => {
            Packet::Coordinator(postcard::from_bytes::<CoordinatorPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::StateSnapshot => {
            Packet::StateSnapshot(postcard::from_bytes::<StateSnapshotPayload>(bytes).map_err(decode_err)?)
        }
        PacketType::CoordinatorAnnounce => Packet::CoordinatorAnnounce(
            postcard::from_bytes::<CoordinatorAnnouncePayload>(bytes).map_err(decode_err)?,
        ),
    })
}

/// Writes one complete packet to `writer`: header then payload, as a single
/// logical frame. A partial write anywhere in the frame is reported as a
/// [`WireError`] and the caller must treat the connection as dead — there is
/// no way to resynchronize a stream mid-frame.
pub fn write_packet<W: Write>(writer: &mut W, packet: &Packet) -> Result<(), WireError> {
    let payload = encode_payload(packet)?;
    let total = FRAME_HEADER_SIZE + payload.len();
    if total > PACKET_MAX {
        return Err(WireError::FrameTooLarge(total));
    }

    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[0..2].copy_from_slice(&packet.packet_type().as_u16().to_be_bytes());
    header[2..6].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    writer.write_all(&header).map_err(WireError::from_io)?;
    writer.write_all(&payload).map_err(WireError::from_io)?;
    writer.flush().map_err(WireError::from_io)?;
    Ok(())
}

/// Reads one complete packet from `reader`. Blocks until a full frame has
/// arrived, the peer closes the connection, or the configured read timeout
/// (if any, set on the underlying stream) elapses.
///
/// A read that stops partway through the header or payload is reported the
/// same as any other connection failure — callers never observe a partial
/// packet.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Packet, WireError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).map_err(WireError::from_io)?;

    let raw_type = u16::from_be_bytes([header[0], header[1]]);
    let length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;

    let ty = PacketType::from_u16(raw_type)
        .ok_or_else(|| WireError::DecodeError(format!("unknown packet type tag {raw_type}")))?;

    if FRAME_HEADER_SIZE + length > PACKET_MAX {
        return Err(WireError::FrameTooLarge(FRAME_HEADER_SIZE + length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).map_err(WireError::from_io)?;

    decode_payload(ty, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use partyline_types::{ReplicaId, SeqNumber, Timestamp, ViewNumber};
    use std::io::Cursor;
    use test_case::test_case;

    fn round_trip(packet: Packet) -> Packet {
        let mut buf = Vec::new();
        write_packet(&mut buf, &packet).expect("encode");
        let mut cursor = Cursor::new(buf);
        read_packet(&mut cursor).expect("decode")
    }

    #[test]
    fn login_round_trips() {
        let packet = Packet::Login(LoginPayload {
            username: "alice".into(),
            groupname: "lobby".into(),
            listen_port: 4040,
        });
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn keep_alive_has_empty_payload() {
        let mut buf = Vec::new();
        write_packet(&mut buf, &Packet::KeepAlive).unwrap();
        assert_eq!(buf.len(), FRAME_HEADER_SIZE);
        assert_eq!(round_trip(Packet::KeepAlive), Packet::KeepAlive);
    }

    #[test]
    fn message_round_trips() {
        let packet = Packet::Message(MessagePayload {
            timestamp: Timestamp::from_secs(1_700_000_000),
            sender: "alice".into(),
            kind: 0,
            body: "hello group".into(),
        });
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn repl_event_round_trips_with_opaque_body() {
        let packet = Packet::ReplEvent(ReplEventPayload {
            view: ViewNumber::new(3),
            seq: SeqNumber::new(42),
            body: vec![1, 2, 3, 4],
        });
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn election_round_trips() {
        let packet = Packet::Election(ElectionPayload {
            view: ViewNumber::new(1),
            from: ReplicaId::new(2),
        });
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn oversized_frame_is_rejected_before_allocating_payload() {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0..2].copy_from_slice(&PacketType::KeepAlive.as_u16().to_be_bytes());
        header[2..6].copy_from_slice(&(PACKET_MAX as u32).to_be_bytes());
        let mut cursor = Cursor::new(header.to_vec());
        let err = read_packet(&mut cursor).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }

    #[test]
    fn short_read_fails_the_connection() {
        let mut buf = Vec::new();
        write_packet(&mut buf, &Packet::Message(MessagePayload {
            timestamp: Timestamp::EPOCH,
            sender: "alice".into(),
            kind: 0,
            body: "hi".into(),
        }))
        .unwrap();
        buf.truncate(buf.len() - 1); // drop the last payload byte
        let mut cursor = Cursor::new(buf);
        let err = read_packet(&mut cursor).unwrap_err();
        assert!(matches!(err, WireError::PeerClosed));
    }

    #[test_case(PacketType::Login => "LOGIN"; "login")]
    #[test_case(PacketType::CoordinatorAnnounce => "COORDINATOR_ANNOUNCE"; "coordinator announce")]
    fn packet_type_display(ty: PacketType) -> String {
        ty.to_string()
    }

    #[test]
    fn unknown_type_tag_is_a_decode_error() {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0..2].copy_from_slice(&255u16.to_be_bytes());
        let mut cursor = Cursor::new(header.to_vec());
        let err = read_packet(&mut cursor).unwrap_err();
        assert!(matches!(err, WireError::DecodeError(_)));
    }
}
