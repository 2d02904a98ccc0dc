//! CTAP HID message framing
//!
//! Splits a command payload into one initialization packet followed by
//! sequenced continuation packets, and reassembles responses.
//!
//! Packet Format (64-byte reports):
//! - Initialization packet: CID(4) + CMD(1) + BCNT(2) + DATA(57)
//! - Continuation packet: CID(4) + SEQ(1) + DATA(59)
//!
//! Devices may report a smaller output report size; capacities shrink with it.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb-hid-framing>

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Largest HID report the framing supports
pub const HID_MAX_PACKET_SIZE: usize = 64;

/// CID(4) + CMD(1) + BCNT(2)
pub const INIT_HEADER_SIZE: usize = 7;

/// CID(4) + SEQ(1)
pub const CONT_HEADER_SIZE: usize = 5;

/// Highest continuation sequence number
pub const MAX_SEQUENCE: u8 = 0x7F;

/// Broadcast channel ID (used for INIT command)
pub const BROADCAST_CID: u32 = 0xFFFFFFFF;

/// Nonce length of an INIT request
pub const INIT_NONCE_SIZE: usize = 8;

/// Payload length of an INIT reply
pub const INIT_REPLY_SIZE: usize = 17;

/// Largest payload a message can carry with the given report size
pub fn max_message_size(report_size: usize) -> usize {
    (report_size - INIT_HEADER_SIZE) + (MAX_SEQUENCE as usize + 1) * (report_size - CONT_HEADER_SIZE)
}

/// Report sizes must leave room for an init header and fit a full-speed report
pub fn validate_report_size(report_size: usize) -> Result<()> {
    if report_size <= INIT_HEADER_SIZE || report_size > HID_MAX_PACKET_SIZE {
        return Err(Error::InvalidReportSize(report_size));
    }
    Ok(())
}

/// CTAP HID commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Transaction that echoes the data back
    Ping = 0x01,

    /// Encapsulated CTAP1/U2F message
    Msg = 0x03,

    /// Place an exclusive lock for one channel
    Lock = 0x04,

    /// Allocate a new CID or synchronize channel
    Init = 0x06,

    /// Request authenticator to provide visual/audible identification
    Wink = 0x08,

    /// Encapsulated CTAP CBOR encoded message
    Cbor = 0x10,

    /// Cancel any outstanding requests on the given CID
    Cancel = 0x11,

    /// The request is still being processed
    Keepalive = 0x3B,

    /// Error response message
    Error = 0x3F,
}

impl Cmd {
    /// Convert from u8 value, ignoring the TYPE bit
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & 0x7F {
            0x01 => Some(Cmd::Ping),
            0x03 => Some(Cmd::Msg),
            0x04 => Some(Cmd::Lock),
            0x06 => Some(Cmd::Init),
            0x08 => Some(Cmd::Wink),
            0x10 => Some(Cmd::Cbor),
            0x11 => Some(Cmd::Cancel),
            0x3B => Some(Cmd::Keepalive),
            0x3F => Some(Cmd::Error),
            _ => None,
        }
    }

    /// Convert to u8 value with TYPE bit set (0x80 for initialization packet)
    pub fn to_u8_init(self) -> u8 {
        (self as u8) | 0x80
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// CTAP HID error codes, carried in the payload of an ERROR response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HidErrorCode {
    InvalidCmd = 0x01,
    InvalidPar = 0x02,
    InvalidLen = 0x03,
    InvalidSeq = 0x04,
    MsgTimeout = 0x05,
    ChannelBusy = 0x06,
    LockRequired = 0x0A,
    InvalidChannel = 0x0B,
    Other = 0x7F,
}

impl HidErrorCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(HidErrorCode::InvalidCmd),
            0x02 => Some(HidErrorCode::InvalidPar),
            0x03 => Some(HidErrorCode::InvalidLen),
            0x04 => Some(HidErrorCode::InvalidSeq),
            0x05 => Some(HidErrorCode::MsgTimeout),
            0x06 => Some(HidErrorCode::ChannelBusy),
            0x0A => Some(HidErrorCode::LockRequired),
            0x0B => Some(HidErrorCode::InvalidChannel),
            0x7F => Some(HidErrorCode::Other),
            _ => None,
        }
    }

    /// Errors about the request itself rather than the device or channel
    pub fn is_message_error(self) -> bool {
        matches!(
            self,
            HidErrorCode::InvalidCmd | HidErrorCode::InvalidPar | HidErrorCode::InvalidLen
        )
    }
}

/// Channel ID of a raw report, if it is long enough to carry one
pub fn channel_of(report: &[u8]) -> Option<u32> {
    let cid: [u8; 4] = report.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(cid))
}

/// A single HID packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Init {
        channel_id: u32,
        cmd: Cmd,
        payload_length: u16,
        data: Vec<u8>,
    },
    Continuation {
        channel_id: u32,
        seq: u8,
        data: Vec<u8>,
    },
}

impl Packet {
    pub fn channel_id(&self) -> u32 {
        match self {
            Packet::Init { channel_id, .. } | Packet::Continuation { channel_id, .. } => *channel_id,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Packet::Init { data, .. } | Packet::Continuation { data, .. } => data,
        }
    }

    pub fn is_init(&self) -> bool {
        matches!(self, Packet::Init { .. })
    }

    /// Header and data, without padding
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HID_MAX_PACKET_SIZE);
        bytes.extend_from_slice(&self.channel_id().to_be_bytes());
        match self {
            Packet::Init {
                cmd, payload_length, ..
            } => {
                bytes.push(cmd.to_u8_init());
                bytes.extend_from_slice(&payload_length.to_be_bytes());
            }
            Packet::Continuation { seq, .. } => bytes.push(*seq),
        }
        bytes.extend_from_slice(self.data());
        bytes
    }

    /// Serialized packet zero-padded to `report_size`
    pub fn to_report(&self, report_size: usize) -> Vec<u8> {
        let mut report = self.to_bytes();
        report.resize(report_size.max(report.len()), 0);
        report
    }

    /// Parse an initialization packet.
    ///
    /// Fails on a short buffer, a clear TYPE bit or an unknown command. The
    /// data is truncated to the declared payload length.
    pub fn try_parse_init(buf: &[u8]) -> Option<Self> {
        if buf.len() < INIT_HEADER_SIZE || buf[4] & 0x80 == 0 {
            return None;
        }
        let channel_id = channel_of(buf)?;
        let cmd = Cmd::from_u8(buf[4])?;
        let payload_length = u16::from_be_bytes([buf[5], buf[6]]);

        let data_len = (payload_length as usize).min(buf.len() - INIT_HEADER_SIZE);
        Some(Packet::Init {
            channel_id,
            cmd,
            payload_length,
            data: buf[INIT_HEADER_SIZE..INIT_HEADER_SIZE + data_len].to_vec(),
        })
    }

    /// Parse a continuation packet. The data keeps any trailing padding.
    pub fn try_parse_continuation(buf: &[u8]) -> Option<Self> {
        if buf.len() < CONT_HEADER_SIZE || buf[4] & 0x80 != 0 {
            return None;
        }
        Some(Packet::Continuation {
            channel_id: channel_of(buf)?,
            seq: buf[4],
            data: buf[CONT_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Split `payload` into the packets of one message.
///
/// The init packet carries the total length and as much payload as fits; each
/// continuation packet carries the next sequence number and slice.
pub fn create_request_packets(
    channel_id: u32,
    cmd: Cmd,
    report_size: usize,
    payload: &[u8],
) -> Result<Vec<Packet>> {
    validate_report_size(report_size)?;
    let max = max_message_size(report_size);
    if payload.len() > max {
        return Err(Error::MessageTooLarge {
            size: payload.len(),
            max,
        });
    }

    let init_capacity = report_size - INIT_HEADER_SIZE;
    let (first, mut remaining) = payload.split_at(payload.len().min(init_capacity));

    let mut packets = vec![Packet::Init {
        channel_id,
        cmd,
        payload_length: payload.len() as u16,
        data: first.to_vec(),
    }];

    let cont_capacity = report_size - CONT_HEADER_SIZE;
    let mut seq = 0u8;
    while !remaining.is_empty() {
        let (chunk, rest) = remaining.split_at(remaining.len().min(cont_capacity));
        packets.push(Packet::Continuation {
            channel_id,
            seq,
            data: chunk.to_vec(),
        });
        remaining = rest;
        seq += 1;
    }

    Ok(packets)
}

/// A CTAP HID message, either being sent packet by packet or reassembled
/// from received reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    channel_id: u32,
    cmd: Cmd,
    payload_length: usize,
    packets: VecDeque<Packet>,
    received: usize,
    next_seq: u8,
}

impl Message {
    /// Frame an outgoing message
    pub fn create(channel_id: u32, cmd: Cmd, report_size: usize, payload: &[u8]) -> Result<Self> {
        let packets = create_request_packets(channel_id, cmd, report_size, payload)?;
        Ok(Self {
            channel_id,
            cmd,
            payload_length: payload.len(),
            received: payload.len(),
            next_seq: (packets.len() - 1) as u8,
            packets: packets.into(),
        })
    }

    /// Start reassembling from a received init report
    pub fn from_init_packet(buf: &[u8]) -> Option<Self> {
        let packet = Packet::try_parse_init(buf)?;
        let (channel_id, cmd, payload_length) = match &packet {
            Packet::Init {
                channel_id,
                cmd,
                payload_length,
                ..
            } => (*channel_id, *cmd, *payload_length as usize),
            Packet::Continuation { .. } => return None,
        };
        if payload_length > max_message_size(HID_MAX_PACKET_SIZE) {
            return None;
        }

        Some(Self {
            channel_id,
            cmd,
            payload_length,
            received: packet.data().len(),
            next_seq: 0,
            packets: VecDeque::from([packet]),
        })
    }

    /// Append a received continuation report
    pub fn add_continuation_packet(&mut self, buf: &[u8]) -> Result<()> {
        if self.is_complete() {
            return Err(Error::MessageComplete);
        }
        let Some(Packet::Continuation {
            channel_id,
            seq,
            mut data,
        }) = Packet::try_parse_continuation(buf)
        else {
            return Err(Error::InvalidPacket);
        };
        if channel_id != self.channel_id {
            return Err(Error::InvalidChannel {
                expected: self.channel_id,
                actual: channel_id,
            });
        }
        if seq != self.next_seq || seq > MAX_SEQUENCE {
            return Err(Error::InvalidSequence {
                expected: self.next_seq,
                actual: seq,
            });
        }

        data.truncate(self.payload_length - self.received);
        self.received += data.len();
        self.next_seq += 1;
        self.packets.push_back(Packet::Continuation {
            channel_id,
            seq,
            data,
        });
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.payload_length
    }

    pub fn num_packets(&self) -> usize {
        self.packets.len()
    }

    /// Next packet to transmit
    pub fn pop_next_packet(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// Concatenated payload of the packets still held
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.payload_length);
        for packet in &self.packets {
            payload.extend_from_slice(packet.data());
        }
        payload
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    pub fn cmd(&self) -> Cmd {
        self.cmd
    }
}

/// CTAPHID capability flags from the INIT reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities(pub u8);

impl Capabilities {
    pub const WINK: u8 = 0x01;
    pub const CBOR: u8 = 0x04;
    pub const NMSG: u8 = 0x08;

    pub fn has_cbor(self) -> bool {
        self.0 & Self::CBOR != 0
    }

    /// The device does not implement CTAPHID_MSG
    pub fn lacks_msg(self) -> bool {
        self.0 & Self::NMSG != 0
    }
}

/// Channel allocation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReply {
    pub nonce: [u8; INIT_NONCE_SIZE],
    pub channel_id: u32,
    pub protocol_version: u8,
    /// Major, minor, build
    pub device_version: (u8, u8, u8),
    pub capabilities: Capabilities,
}

impl InitReply {
    /// Parse the 17-byte payload of an INIT response
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != INIT_REPLY_SIZE {
            return None;
        }
        Some(Self {
            nonce: payload[..8].try_into().ok()?,
            channel_id: u32::from_be_bytes(payload[8..12].try_into().ok()?),
            protocol_version: payload[12],
            device_version: (payload[13], payload[14], payload[15]),
            capabilities: Capabilities(payload[16]),
        })
    }

    /// Serialize back into a 17-byte payload
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(INIT_REPLY_SIZE);
        payload.extend_from_slice(&self.nonce);
        payload.extend_from_slice(&self.channel_id.to_be_bytes());
        payload.push(self.protocol_version);
        payload.extend_from_slice(&[
            self.device_version.0,
            self.device_version.1,
            self.device_version.2,
        ]);
        payload.push(self.capabilities.0);
        payload
    }
}

/// Accept `report` as the reply to an INIT carrying `nonce`.
///
/// The reply has to arrive on the broadcast channel as a complete single-frame
/// INIT message and echo the nonce.
pub fn parse_init_reply(nonce: &[u8; INIT_NONCE_SIZE], report: &[u8]) -> Option<InitReply> {
    let message = Message::from_init_packet(report)?;
    if message.channel_id() != BROADCAST_CID || !message.is_complete() || message.cmd() != Cmd::Init
    {
        return None;
    }
    let reply = InitReply::from_payload(&message.payload())?;
    if &reply.nonce != nonce {
        return None;
    }
    Some(reply)
}
