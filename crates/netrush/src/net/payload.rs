//! Payload bodies: the compression flag byte, the compact ASCII cell-list
//! dialect, and the tagged record types carried by INIT_ACK, EVENT, ACK,
//! SNAPSHOT and GAME_OVER.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::grid::Change;
use crate::net::error::ProtocolError;

pub const FLAG_RAW: u8 = 0x00;
pub const FLAG_ZLIB: u8 = 0x01;

/// Raw body size above which the encoder switches to zlib.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1000;

const ZLIB_LEVEL: u32 = 6;

/// Prefixes `raw` with the compression flag, deflating when the caller
/// forces it or the body crosses `threshold`. An empty body stays empty
/// (no flag byte).
pub fn encode_body(raw: &[u8], force_compress: bool, threshold: usize) -> Result<Vec<u8>, ProtocolError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if force_compress || raw.len() > threshold {
        let zlib_failed = |e: std::io::Error| ProtocolError::MalformedPayload(format!("zlib encode: {e}"));
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(raw.len() / 2 + 1),
            Compression::new(ZLIB_LEVEL),
        );
        encoder.write_all(raw).map_err(zlib_failed)?;
        let compressed = encoder.finish().map_err(zlib_failed)?;

        let mut body = Vec::with_capacity(compressed.len() + 1);
        body.push(FLAG_ZLIB);
        body.extend_from_slice(&compressed);
        Ok(body)
    } else {
        let mut body = Vec::with_capacity(raw.len() + 1);
        body.push(FLAG_RAW);
        body.extend_from_slice(raw);
        Ok(body)
    }
}

/// Strips the compression flag, inflating when set. Decoders always honor
/// the flag regardless of how the sender decided.
pub fn decode_body(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let Some((&flag, rest)) = payload.split_first() else {
        return Ok(Vec::new());
    };
    match flag {
        FLAG_RAW => Ok(rest.to_vec()),
        FLAG_ZLIB => {
            let mut decoder = ZlibDecoder::new(rest);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|_| ProtocolError::DecompressionFailed)?;
            Ok(out)
        }
        other => Err(ProtocolError::MalformedPayload(format!(
            "unknown compression flag {other:#04x}"
        ))),
    }
}

/// Serializes changes as `"r,c,o;r,c,o"`. The empty list is the empty
/// string.
pub fn format_cells(cells: &[Change]) -> String {
    let mut out = String::new();
    for (i, change) in cells.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push_str(&format!("{},{},{}", change.row, change.col, change.owner));
    }
    out
}

/// Strict inverse of [`format_cells`]: one malformed triple fails the whole
/// list.
pub fn parse_cells(s: &str) -> Result<Vec<Change>, ProtocolError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let mut cells = Vec::new();
    for triple in s.split(';') {
        let mut fields = triple.split(',');
        let row = fields.next();
        let col = fields.next();
        let owner = fields.next();
        let (Some(row), Some(col), Some(owner), None) = (row, col, owner, fields.next()) else {
            return Err(ProtocolError::MalformedPayload(format!(
                "bad cell triple {triple:?}"
            )));
        };
        let parsed = row
            .parse::<u16>()
            .and_then(|r| col.parse::<u16>().map(|c| (r, c)))
            .and_then(|(r, c)| owner.parse::<u32>().map(|o| Change::new(r, c, o)));
        match parsed {
            Ok(change) => cells.push(change),
            Err(_) => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "bad cell triple {triple:?}"
                )))
            }
        }
    }
    Ok(cells)
}

/// INIT_ACK body: the id the server assigned to this address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitAckBody {
    pub client_id: u32,
}

/// EVENT body: a claim request for the flat cell index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBody {
    pub cell: u16,
    pub client_id: u32,
    pub ts: u64,
}

/// ACK body: the resolved owner of the contested cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckBody {
    pub cell: u16,
    pub owner: u32,
}

/// One redundancy-tail entry: a prior snapshot's id and its change list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundantEntry {
    pub snapshot_id: u32,
    pub changes: String,
}

impl RedundantEntry {
    pub fn changes(&self) -> Result<Vec<Change>, ProtocolError> {
        parse_cells(&self.changes)
    }
}

/// SNAPSHOT body. `grid` is present iff `full`; `changes` is always the
/// current tick's delta; `redundant` carries the previous K snapshots'
/// change lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub full: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<String>,
    pub changes: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redundant: Vec<RedundantEntry>,
}

impl SnapshotBody {
    pub fn grid_cells(&self) -> Result<Vec<Change>, ProtocolError> {
        match &self.grid {
            Some(list) => parse_cells(list),
            None => Ok(Vec::new()),
        }
    }

    pub fn change_cells(&self) -> Result<Vec<Change>, ProtocolError> {
        parse_cells(&self.changes)
    }
}

/// GAME_OVER body: the winner set and the final board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverBody {
    pub winners: Vec<u32>,
    pub final_grid: String,
}

impl GameOverBody {
    pub fn final_cells(&self) -> Result<Vec<Change>, ProtocolError> {
        parse_cells(&self.final_grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_list_round_trip() {
        let cells = vec![
            Change::new(0, 0, 1),
            Change::new(2, 2, 1),
            Change::new(19, 19, 4),
        ];
        let text = format_cells(&cells);
        assert_eq!(text, "0,0,1;2,2,1;19,19,4");
        assert_eq!(parse_cells(&text).unwrap(), cells);
    }

    #[test]
    fn empty_cell_list_round_trip() {
        assert_eq!(format_cells(&[]), "");
        assert_eq!(parse_cells("").unwrap(), Vec::new());
    }

    #[test]
    fn cell_list_parse_is_strict() {
        assert!(parse_cells("1,2").is_err());
        assert!(parse_cells("1,2,3,4").is_err());
        assert!(parse_cells("a,2,3").is_err());
        assert!(parse_cells("0,0,1;;1,1,2").is_err());
        assert!(parse_cells("0,0,1;1,1").is_err());
    }

    #[test]
    fn small_body_stays_raw() {
        let body = encode_body(b"short", false, DEFAULT_COMPRESSION_THRESHOLD).unwrap();
        assert_eq!(body[0], FLAG_RAW);
        assert_eq!(decode_body(&body).unwrap(), b"short");
    }

    #[test]
    fn body_over_threshold_is_compressed() {
        let raw = vec![b'x'; DEFAULT_COMPRESSION_THRESHOLD + 1];
        let body = encode_body(&raw, false, DEFAULT_COMPRESSION_THRESHOLD).unwrap();
        assert_eq!(body[0], FLAG_ZLIB);
        assert!(body.len() < raw.len());
        assert_eq!(decode_body(&body).unwrap(), raw);
    }

    #[test]
    fn forced_compression_round_trips() {
        let body = encode_body(b"tiny", true, DEFAULT_COMPRESSION_THRESHOLD).unwrap();
        assert_eq!(body[0], FLAG_ZLIB);
        assert_eq!(decode_body(&body).unwrap(), b"tiny");
    }

    #[test]
    fn empty_body_omits_flag() {
        assert!(encode_body(b"", false, DEFAULT_COMPRESSION_THRESHOLD)
            .unwrap()
            .is_empty());
        assert!(decode_body(b"").unwrap().is_empty());
    }

    #[test]
    fn unknown_flag_rejected() {
        assert!(matches!(
            decode_body(&[0x02, 1, 2, 3]).unwrap_err(),
            ProtocolError::MalformedPayload(_)
        ));
    }

    #[test]
    fn garbage_after_zlib_flag_rejected() {
        assert_eq!(
            decode_body(&[FLAG_ZLIB, 0xde, 0xad]).unwrap_err(),
            ProtocolError::DecompressionFailed
        );
    }

    #[test]
    fn record_round_trips() {
        let snap = SnapshotBody {
            full: true,
            grid: Some("0,0,1;1,1,2".into()),
            changes: "1,1,2".into(),
            redundant: vec![RedundantEntry {
                snapshot_id: 4,
                changes: "0,0,1".into(),
            }],
        };
        let json = serde_json::to_vec(&snap).unwrap();
        let back: SnapshotBody = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, snap);

        let over = GameOverBody {
            winners: vec![1, 3],
            final_grid: "0,0,1".into(),
        };
        let json = serde_json::to_vec(&over).unwrap();
        assert_eq!(serde_json::from_slice::<GameOverBody>(&json).unwrap(), over);
    }

    #[test]
    fn delta_body_omits_grid_key() {
        let snap = SnapshotBody {
            full: false,
            grid: None,
            changes: String::new(),
            redundant: Vec::new(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("grid"));
        assert!(!json.contains("redundant"));
    }
}
