//! Packed key layouts
//!
//! All integers are big-endian with the sign bit flipped, so unsigned byte
//! order equals numeric order and negative values sort before positive ones.
//! Accessions and secondary ids are written verbatim and terminated by a
//! single `0x00`; they must not contain NUL bytes themselves.
//!
//! | Table       | Layout                                                  |
//! |-------------|---------------------------------------------------------|
//! | bioseq info | `accession 0x00 version:i32 seq_id_type:i16 gi:i64`     |
//! | si2csi      | `sec_seq_id 0x00 sec_seq_id_type:i16`                   |
//! | blob prop   | `sat:i32 sat_key:i32 !last_modified:i64` (newest first) |

const SEPARATOR: u8 = 0x00;

const BIOSEQ_SUFFIX_LEN: usize = 4 + 2 + 8;
const SI2CSI_SUFFIX_LEN: usize = 2;
const BLOB_PROP_KEY_LEN: usize = 4 + 4 + 8;

/// Unpacked bioseq info key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BioseqInfoKey {
    pub accession: String,
    pub version: i32,
    pub seq_id_type: i16,
    pub gi: i64,
}

/// Unpacked blob prop key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobPropKey {
    pub sat: i32,
    pub sat_key: i32,
    pub last_modified: i64,
}

fn put_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&((v as u16) ^ 0x8000).to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&((v as u32) ^ 0x8000_0000).to_be_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&((v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes());
}

fn get_i16(bytes: &[u8]) -> Option<i16> {
    let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some((u16::from_be_bytes(raw) ^ 0x8000) as i16)
}

fn get_i32(bytes: &[u8]) -> Option<i32> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some((u32::from_be_bytes(raw) ^ 0x8000_0000) as i32)
}

fn get_i64(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ 0x8000_0000_0000_0000) as i64)
}

/// Split `text 0x00 rest`, requiring valid UTF-8 text
fn split_text(key: &[u8]) -> Option<(&str, &[u8])> {
    let sep = key.iter().position(|b| *b == SEPARATOR)?;
    let text = std::str::from_utf8(&key[..sep]).ok()?;
    Some((text, &key[sep + 1..]))
}

// ---- Bioseq info ----

/// Prefix covering every record of an accession
#[must_use]
pub fn bioseq_info_prefix(accession: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(accession.len() + 1 + BIOSEQ_SUFFIX_LEN);
    key.extend_from_slice(accession.as_bytes());
    key.push(SEPARATOR);
    key
}

/// Prefix covering every record of an accession version
#[must_use]
pub fn bioseq_info_version_prefix(accession: &str, version: i32) -> Vec<u8> {
    let mut key = bioseq_info_prefix(accession);
    put_i32(&mut key, version);
    key
}

/// Prefix covering every GI of an accession version and type
#[must_use]
pub fn bioseq_info_type_prefix(accession: &str, version: i32, seq_id_type: i16) -> Vec<u8> {
    let mut key = bioseq_info_version_prefix(accession, version);
    put_i16(&mut key, seq_id_type);
    key
}

#[must_use]
pub fn pack_bioseq_info_key(accession: &str, version: i32, seq_id_type: i16, gi: i64) -> Vec<u8> {
    let mut key = bioseq_info_type_prefix(accession, version, seq_id_type);
    put_i64(&mut key, gi);
    key
}

/// Inverse of [`pack_bioseq_info_key`]; `None` on truncated or malformed keys
#[must_use]
pub fn unpack_bioseq_info_key(key: &[u8]) -> Option<BioseqInfoKey> {
    let (accession, rest) = split_text(key)?;
    if rest.len() != BIOSEQ_SUFFIX_LEN {
        return None;
    }
    Some(BioseqInfoKey {
        accession: accession.to_string(),
        version: get_i32(rest)?,
        seq_id_type: get_i16(&rest[4..])?,
        gi: get_i64(&rest[6..])?,
    })
}

// ---- Si2csi ----

/// Prefix covering every type of a secondary id
#[must_use]
pub fn si2csi_prefix(sec_seq_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(sec_seq_id.len() + 1 + SI2CSI_SUFFIX_LEN);
    key.extend_from_slice(sec_seq_id.as_bytes());
    key.push(SEPARATOR);
    key
}

#[must_use]
pub fn pack_si2csi_key(sec_seq_id: &str, sec_seq_id_type: i16) -> Vec<u8> {
    let mut key = si2csi_prefix(sec_seq_id);
    put_i16(&mut key, sec_seq_id_type);
    key
}

/// Inverse of [`pack_si2csi_key`]
#[must_use]
pub fn unpack_si2csi_key(key: &[u8]) -> Option<(String, i16)> {
    let (sec_seq_id, rest) = split_text(key)?;
    if rest.len() != SI2CSI_SUFFIX_LEN {
        return None;
    }
    Some((sec_seq_id.to_string(), get_i16(rest)?))
}

// ---- Blob prop ----

/// Prefix covering every version of a blob
#[must_use]
pub fn blob_prop_prefix(sat: i32, sat_key: i32) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOB_PROP_KEY_LEN);
    put_i32(&mut key, sat);
    put_i32(&mut key, sat_key);
    key
}

#[must_use]
pub fn pack_blob_prop_key(sat: i32, sat_key: i32, last_modified: i64) -> Vec<u8> {
    let mut key = blob_prop_prefix(sat, sat_key);
    put_i64(&mut key, !last_modified);
    key
}

/// Inverse of [`pack_blob_prop_key`]
#[must_use]
pub fn unpack_blob_prop_key(key: &[u8]) -> Option<BlobPropKey> {
    if key.len() != BLOB_PROP_KEY_LEN {
        return None;
    }
    Some(BlobPropKey {
        sat: get_i32(key)?,
        sat_key: get_i32(&key[4..])?,
        last_modified: !get_i64(&key[8..])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bioseq_key_round_trip() {
        for gi in [0, -1, i64::MIN, 12_345, i64::MAX] {
            for (version, seq_id_type) in [(0, 0), (11, 5), (i32::MAX, i16::MAX)] {
                let key = pack_bioseq_info_key("NC_000001", version, seq_id_type, gi);
                let unpacked = unpack_bioseq_info_key(&key).unwrap();
                assert_eq!(unpacked.accession, "NC_000001");
                assert_eq!(
                    (unpacked.version, unpacked.seq_id_type, unpacked.gi),
                    (version, seq_id_type, gi)
                );
            }
        }
    }

    #[test]
    fn test_bioseq_key_layout() {
        let key = pack_bioseq_info_key("AB", 11, 5, 0);
        assert_eq!(
            key,
            [
                b'A', b'B', 0x00, // accession
                0x80, 0x00, 0x00, 0x0b, // version
                0x80, 0x05, // seq_id_type
                0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // gi
            ]
        );
    }

    #[test]
    fn test_bioseq_key_order_is_numeric() {
        let mut keys = vec![
            pack_bioseq_info_key("NC_000001", 11, 5, 1),
            pack_bioseq_info_key("NC_000001", 2, 5, 1),
            pack_bioseq_info_key("NC_000001", 11, 5, -7),
            pack_bioseq_info_key("NC_000001", 11, 10, 0),
        ];
        keys.sort();
        let order: Vec<_> = keys
            .iter()
            .map(|k| {
                let k = unpack_bioseq_info_key(k).unwrap();
                (k.version, k.seq_id_type, k.gi)
            })
            .collect();
        assert_eq!(order, vec![(2, 5, 1), (11, 5, -7), (11, 5, 1), (11, 10, 0)]);
    }

    #[test]
    fn test_bioseq_prefixes_nest() {
        let key = pack_bioseq_info_key("NC_000001", 11, 5, 12_345);
        assert!(key.starts_with(&bioseq_info_prefix("NC_000001")));
        assert!(key.starts_with(&bioseq_info_version_prefix("NC_000001", 11)));
        assert!(key.starts_with(&bioseq_info_type_prefix("NC_000001", 11, 5)));
        // The separator keeps one accession from matching a longer one
        assert!(!pack_bioseq_info_key("NC_0000011", 1, 5, 0)
            .starts_with(&bioseq_info_prefix("NC_000001")));
    }

    #[test]
    fn test_bioseq_unpack_rejects_malformed() {
        let key = pack_bioseq_info_key("NC_000001", 11, 5, 12_345);
        for len in 0..key.len() {
            assert!(unpack_bioseq_info_key(&key[..len]).is_none(), "len {len}");
        }
        let mut long = key.clone();
        long.push(0);
        assert!(unpack_bioseq_info_key(&long).is_none());
        assert!(unpack_bioseq_info_key(b"no separator at all").is_none());

        let mut bad_utf8 = vec![0xff, 0xfe];
        bad_utf8.extend_from_slice(&key[9..]);
        assert!(unpack_bioseq_info_key(&bad_utf8).is_none());
    }

    #[test]
    fn test_si2csi_key() {
        let key = pack_si2csi_key("568815597", 12);
        assert_eq!(unpack_si2csi_key(&key), Some(("568815597".to_string(), 12)));
        assert!(key.starts_with(&si2csi_prefix("568815597")));
        assert!(unpack_si2csi_key(&key[..key.len() - 1]).is_none());
    }

    #[test]
    fn test_blob_prop_key_newest_first() {
        let old = pack_blob_prop_key(4, 100, 1_000);
        let new = pack_blob_prop_key(4, 100, 2_000);
        assert!(new < old);
        assert!(old.starts_with(&blob_prop_prefix(4, 100)));

        let unpacked = unpack_blob_prop_key(&new).unwrap();
        assert_eq!(
            unpacked,
            BlobPropKey {
                sat: 4,
                sat_key: 100,
                last_modified: 2_000
            }
        );
        assert!(unpack_blob_prop_key(&new[..15]).is_none());
        assert_eq!(unpack_blob_prop_key(&pack_blob_prop_key(1, -1, -5)).unwrap().sat_key, -1);
    }
}
