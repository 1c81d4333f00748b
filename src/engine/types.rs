//! DTOs describing a torrent as returned by the external BT engine's
//! control API. Generalises the teacher's rqbit-specific response shapes
//! into the domain's own vocabulary.

use serde::{Deserialize, Serialize};

/// One file inside a torrent's info dictionary, plus the piece range it
/// occupies once the concatenated-file-space offsets are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileInfo {
    pub path: String,
    pub length: u64,
    pub begin_piece: u32,
    pub end_piece: u32,
}

/// A torrent's post-info metadata as surfaced by the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentSummary {
    pub id: u64,
    #[serde(with = "hex_info_hash")]
    pub info_hash: [u8; 20],
    pub name: String,
    pub piece_length: u64,
    pub files: Vec<TorrentFileInfo>,
}

mod hex_info_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_: Vec<u8>| serde::de::Error::custom("info_hash must be 20 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_round_trips_through_hex_encoding() {
        let summary = TorrentSummary {
            id: 1,
            info_hash: [0xab; 20],
            name: "Movie".into(),
            piece_length: 1 << 18,
            files: vec![TorrentFileInfo {
                path: "movie.mkv".into(),
                length: 10,
                begin_piece: 0,
                end_piece: 1,
            }],
        };
        let json = serde_json::to_string(&summary).unwrap();
        let parsed: TorrentSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.info_hash, [0xab; 20]);
        assert_eq!(parsed.files.len(), 1);
    }
}
