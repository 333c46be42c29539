use bytes::{BufMut, BytesMut};
use std::str::FromStr;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{unreachable_vector, Address, DecodeError, DistanceVector, Error, MAX_NODES, MAX_PACKET_SIZE};
use crate::time::Timestamp;
use super::packet::{Packet, PacketKind};

/// Separates packet fields on the wire
pub const FIELD_DELIMITER: char = ';';

/// Separates distances inside a distance-vector payload
pub const VECTOR_DELIMITER: char = '-';

/// Placeholder written for, and read as, an absent field
pub const ABSENT: &str = "n/a";

/// Prefixed to a text field whose value would otherwise read as [`ABSENT`],
/// or that itself starts with this prefix
pub const ESCAPE: char = '\\';

/// Number of fields in a complete packet
const FIELD_COUNT: usize = 7;

/// Encodes a packet as `type;dest;src;src_addr;seq;timestamp;payload`
pub fn encode(packet: &Packet) -> String {
    fn field<T: ToString>(value: &Option<T>) -> String {
        value.as_ref().map_or_else(|| ABSENT.to_string(), ToString::to_string)
    }

    fn text(value: Option<&str>) -> String {
        match value {
            None => ABSENT.to_string(),
            Some(s) if s == ABSENT || s.starts_with(ESCAPE) => format!("{}{}", ESCAPE, s),
            Some(s) => s.to_string(),
        }
    }

    [
        packet.kind.as_str().to_string(),
        field(&packet.dest_id),
        field(&packet.src_id),
        text(packet.src_address.as_ref().map(Address::as_str)),
        field(&packet.sequence_number),
        field(&packet.timestamp.map(|t| t.as_micros())),
        text(packet.payload.as_deref()),
    ]
    .join(&FIELD_DELIMITER.to_string())
}

/// Decodes a datagram into a packet.
///
/// Missing trailing fields decode as absent. Only an unrecognized kind, a
/// malformed numeric field or an oversized datagram is an error. The payload
/// is everything after the sixth delimiter.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(DecodeError::TooLong(bytes.len()));
    }
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
    let text = text.trim_end_matches(['\0', '\r', '\n']);

    let mut fields = text.splitn(FIELD_COUNT, FIELD_DELIMITER);
    let kind: PacketKind = fields.next().unwrap_or_default().parse()?;

    let dest_id = parse_field(fields.next(), "dest_id")?;
    let src_id = parse_field(fields.next(), "src_id")?;
    let src_address = unescape(fields.next()).map(Into::into);
    let sequence_number = parse_field(fields.next(), "sequence_number")?;
    let timestamp = parse_field::<u64>(fields.next(), "timestamp")?.map(Timestamp::from_micros);
    let payload = unescape(fields.next()).map(str::to_string);

    Ok(Packet {
        kind,
        dest_id,
        src_id,
        src_address,
        sequence_number,
        timestamp,
        payload,
    })
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| *s != ABSENT)
}

fn unescape(raw: Option<&str>) -> Option<&str> {
    present(raw).map(|s| s.strip_prefix(ESCAPE).unwrap_or(s))
}

fn parse_field<T: FromStr>(raw: Option<&str>, name: &'static str) -> Result<Option<T>, DecodeError> {
    present(raw)
        .map(|s| s.parse::<T>().map_err(|_| DecodeError::invalid(name, s)))
        .transpose()
}

/// Encodes a distance vector as `d0-d1-...`
pub fn encode_vector(vector: &DistanceVector) -> String {
    vector
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(&VECTOR_DELIMITER.to_string())
}

/// Decodes a distance-vector payload. Missing entries mean no route.
pub fn decode_vector(payload: &str) -> Result<DistanceVector, DecodeError> {
    let mut vector = unreachable_vector();
    for (slot, entry) in vector.iter_mut().zip(payload.split(VECTOR_DELIMITER)) {
        *slot = entry
            .trim()
            .parse()
            .map_err(|_| DecodeError::invalid("distance", entry))?;
    }
    if payload.split(VECTOR_DELIMITER).count() < MAX_NODES {
        tracing::debug!(payload, "short distance vector, padding with no-route entries");
    }
    Ok(vector)
}

/// Datagram codec: one frame per datagram, as handed over by the transport
#[derive(Debug, Clone, Default)]
pub struct PacketCodec;

impl PacketCodec {
    /// Creates a new packet codec
    pub fn new() -> Self {
        PacketCodec
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let datagram = src.split_to(src.len());
        Ok(Some(decode(&datagram)?))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = encode(&item);
        if text.len() > MAX_PACKET_SIZE {
            return Err(DecodeError::TooLong(text.len()).into());
        }

        dst.reserve(text.len());
        dst.put_slice(text.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeId, NO_ROUTE_DISTANCE, POISON_DISTANCE};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TEXT_CHARS: &[u8] = b"abcnz019./:-_ \\";

    fn random_text(rng: &mut StdRng) -> String {
        if rng.gen_bool(0.1) {
            return ABSENT.to_string();
        }
        let len = rng.gen_range(0..12);
        (0..len)
            .map(|_| TEXT_CHARS[rng.gen_range(0..TEXT_CHARS.len())] as char)
            .collect()
    }

    fn random_id(rng: &mut StdRng) -> NodeId {
        if rng.gen_bool(0.2) {
            NodeId::UNASSIGNED
        } else {
            NodeId::new(rng.gen_range(0..u16::MAX))
        }
    }

    fn random_packet(rng: &mut StdRng) -> Packet {
        let kinds = [PacketKind::Token, PacketKind::Data, PacketKind::Ack, PacketKind::DistanceVector];
        Packet {
            kind: kinds[rng.gen_range(0..kinds.len())],
            dest_id: rng.gen_bool(0.8).then(|| random_id(rng)),
            src_id: rng.gen_bool(0.8).then(|| random_id(rng)),
            src_address: rng.gen_bool(0.8).then(|| Address::new(random_text(rng))),
            sequence_number: rng.gen_bool(0.8).then(|| rng.gen()),
            timestamp: rng.gen_bool(0.8).then(|| Timestamp::from_micros(rng.gen())),
            payload: rng.gen_bool(0.8).then(|| random_text(rng)),
        }
    }

    fn full_packet() -> Packet {
        Packet {
            kind: PacketKind::Data,
            dest_id: Some(NodeId::new(3)),
            src_id: Some(NodeId::new(1)),
            src_address: Some(Address::new("192.168.4.10")),
            sequence_number: Some(17),
            timestamp: Some(Timestamp::from_micros(123_456)),
            payload: Some("hello".into()),
        }
    }

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(&full_packet()), "data;3;1;192.168.4.10;17;123456;hello");
        assert_eq!(encode(&Packet::new(PacketKind::Ack)), "ack;n/a;n/a;n/a;n/a;n/a;n/a");
    }

    #[test]
    fn test_round_trip() {
        let packets = [
            full_packet(),
            Packet::new(PacketKind::Token).with_payload("4"),
            Packet::addressed(PacketKind::DistanceVector, NodeId::UNASSIGNED, NodeId::ROOT, Timestamp::ZERO)
                .with_payload(""),
        ];
        for packet in packets {
            assert_eq!(decode(encode(&packet).as_bytes()).unwrap(), packet);
        }
    }

    #[test]
    fn test_round_trip_property() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..500 {
            let packet = random_packet(&mut rng);
            let text = encode(&packet);
            assert_eq!(decode(text.as_bytes()).unwrap(), packet, "{}", text);
        }
    }

    #[test]
    fn test_marker_text_is_escaped() {
        let mut packet = Packet::new(PacketKind::Data).with_payload(ABSENT);
        packet.src_address = Some(Address::new(ABSENT));
        assert_eq!(encode(&packet), "data;n/a;n/a;\\n/a;n/a;n/a;\\n/a");
        assert_eq!(decode(encode(&packet).as_bytes()).unwrap(), packet);

        let packet = Packet::new(PacketKind::Data).with_payload("\\x");
        assert_eq!(encode(&packet), "data;n/a;n/a;n/a;n/a;n/a;\\\\x");
        assert_eq!(decode(encode(&packet).as_bytes()).unwrap(), packet);
        assert_eq!(decode(b"data;1;0;n/a;0;0;n/a").unwrap().payload, None);
    }

    #[test]
    fn test_short_packet_decodes_absent_fields() {
        let packet = decode(b"dv;1;0").unwrap();
        assert_eq!(packet.kind, PacketKind::DistanceVector);
        assert_eq!(packet.dest_id, Some(NodeId::new(1)));
        assert_eq!(packet.src_id, Some(NodeId::ROOT));
        assert_eq!(packet.src_address, None);
        assert_eq!(packet.sequence_number, None);
        assert_eq!(packet.timestamp, None);
        assert_eq!(packet.payload, None);
        assert_ne!(packet.payload, Some(String::new()));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(decode(b"ping;1;2"), Err(DecodeError::UnknownKind("ping".into())));
        assert_eq!(decode(b""), Err(DecodeError::UnknownKind(String::new())));
    }

    #[test]
    fn test_malformed_fields_rejected() {
        assert!(matches!(
            decode(b"data;x;1"),
            Err(DecodeError::InvalidField { field: "dest_id", .. })
        ));
        assert!(matches!(
            decode(b"data;1;1;addr;-4"),
            Err(DecodeError::InvalidField { field: "sequence_number", .. })
        ));
        assert_eq!(decode(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
        assert_eq!(
            decode(&vec![b'a'; MAX_PACKET_SIZE + 1]),
            Err(DecodeError::TooLong(MAX_PACKET_SIZE + 1))
        );
    }

    #[test]
    fn test_trailing_nul_ignored() {
        let packet = decode(b"token;-1;0;192.168.4.10;0;5;1\0\0").unwrap();
        assert_eq!(packet.dest_id, Some(NodeId::UNASSIGNED));
        assert_eq!(packet.payload.as_deref(), Some("1"));
    }

    #[test]
    fn test_vector_round_trip() {
        let mut vector = unreachable_vector();
        vector[0] = 0;
        vector[1] = 1;
        vector[2] = POISON_DISTANCE;

        let text = encode_vector(&vector);
        assert!(text.starts_with("0-1-17-16"));
        assert_eq!(decode_vector(&text).unwrap(), vector);
    }

    #[test]
    fn test_short_vector_padded() {
        let vector = decode_vector("0-1-2").unwrap();
        assert_eq!(&vector[..3], &[0, 1, 2]);
        assert!(vector[3..].iter().all(|&d| d == NO_ROUTE_DISTANCE));
        assert!(decode_vector("0-a").is_err());
    }

    #[test]
    fn test_codec_frames_datagrams() {
        let mut codec = PacketCodec::new();
        let mut bytes = BytesMut::new();

        codec.encode(full_packet(), &mut bytes).unwrap();
        let decoded = codec.decode(&mut bytes).unwrap().unwrap();
        assert_eq!(decoded, full_packet());
        assert!(codec.decode(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_codec_rejects_oversized_packet() {
        let mut codec = PacketCodec::new();
        let mut bytes = BytesMut::new();
        let packet = full_packet().with_payload("x".repeat(MAX_PACKET_SIZE));
        assert!(codec.encode(packet, &mut bytes).is_err());
    }
}
