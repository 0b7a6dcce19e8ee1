//! Core type definitions for seqgate
//!
//! This module defines the identifiers and records that flow between the
//! caches, the database fetch layer and the request processors.

use crate::error::GatewayError;
use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Seq-id type codes (choice numbers of the Seq-id union)
pub mod seq_id_type {
    pub const LOCAL: i16 = 1;
    pub const GENBANK: i16 = 5;
    pub const EMBL: i16 = 6;
    pub const PIR: i16 = 7;
    pub const SWISSPROT: i16 = 8;
    pub const PATENT: i16 = 9;
    pub const OTHER: i16 = 10;
    pub const GENERAL: i16 = 11;
    pub const GI: i16 = 12;
    pub const DDBJ: i16 = 13;
    pub const PRF: i16 = 14;
    pub const PDB: i16 = 15;
    pub const TPG: i16 = 16;
    pub const TPE: i16 = 17;
    pub const TPD: i16 = 18;
    pub const GPIPE: i16 = 19;

    /// Map a FASTA-style tag (`ref`, `gb`, ...) to its type code
    #[must_use]
    pub fn from_fasta_tag(tag: &str) -> Option<i16> {
        let code = match tag.to_ascii_lowercase().as_str() {
            "lcl" => LOCAL,
            "gb" => GENBANK,
            "emb" => EMBL,
            "pir" => PIR,
            "sp" => SWISSPROT,
            "pat" => PATENT,
            "ref" => OTHER,
            "gnl" => GENERAL,
            "gi" => GI,
            "dbj" => DDBJ,
            "prf" => PRF,
            "pdb" => PDB,
            "tpg" => TPG,
            "tpe" => TPE,
            "tpd" => TPD,
            "gpp" => GPIPE,
            _ => return None,
        };
        Some(code)
    }
}

/// Milliseconds per blob version step
pub const BLOB_VERSION_DIVISOR_MS: i64 = 60_000;

/// Fully resolved sequence identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalSeqId {
    pub accession: String,
    pub version: i32,
    pub seq_id_type: i16,
    pub gi: i64,
}

impl CanonicalSeqId {
    pub fn new(accession: impl Into<String>, version: i32, seq_id_type: i16, gi: i64) -> Self {
        Self {
            accession: accession.into(),
            version,
            seq_id_type,
            gi,
        }
    }

    /// Cache key for this identifier (GI is not part of the key)
    #[must_use]
    pub fn key(&self) -> SeqKey {
        SeqKey {
            accession: self.accession.clone(),
            version: self.version,
            seq_id_type: self.seq_id_type,
        }
    }
}

impl fmt::Display for CanonicalSeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version > 0 {
            write!(f, "{}.{}", self.accession, self.version)
        } else {
            write!(f, "{}", self.accession)
        }
    }
}

/// Composite cache key `(accession, version, seq_id_type)`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{accession}.{version}/{seq_id_type}")]
pub struct SeqKey {
    pub accession: String,
    pub version: i32,
    pub seq_id_type: i16,
}

/// A seq-id as it arrived in a request, split into its optional parts
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParsedSeqId {
    /// Original request text
    pub text: String,
    pub accession: String,
    pub version: Option<i32>,
    pub seq_id_type: Option<i16>,
    pub gi: Option<i64>,
}

impl ParsedSeqId {
    /// Parse a request seq-id.
    ///
    /// Accepted shapes: `ACC`, `ACC.VER`, a bare GI number, and FASTA-style
    /// `tag|ACC.VER|` (`gi|12345` included). An explicit `seq_id_type` from the
    /// request wins over the FASTA tag.
    pub fn parse(text: &str, seq_id_type: Option<i16>) -> Result<Self, GatewayError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::InvalidSeqId("empty seq-id".to_string()));
        }
        if trimmed.contains('\0') {
            return Err(GatewayError::InvalidSeqId(format!(
                "seq-id contains NUL byte: {trimmed:?}"
            )));
        }

        let (tag_type, body) = match trimmed.split_once('|') {
            Some((tag, rest)) => {
                let tag_type = seq_id_type::from_fasta_tag(tag).ok_or_else(|| {
                    GatewayError::InvalidSeqId(format!("unknown seq-id tag '{tag}'"))
                })?;
                let body = rest.split('|').next().unwrap_or_default();
                (Some(tag_type), body)
            }
            None => (None, trimmed),
        };
        if body.is_empty() {
            return Err(GatewayError::InvalidSeqId(format!("no accession in '{trimmed}'")));
        }

        let seq_id_type = seq_id_type.or(tag_type);
        let is_gi_type = seq_id_type == Some(seq_id_type::GI);
        let all_digits = body.bytes().all(|b| b.is_ascii_digit());

        if is_gi_type || (seq_id_type.is_none() && all_digits) {
            let gi = body
                .parse::<i64>()
                .map_err(|_| GatewayError::InvalidSeqId(format!("bad GI '{body}'")))?;
            return Ok(Self {
                text: trimmed.to_string(),
                accession: body.to_string(),
                version: None,
                seq_id_type: Some(seq_id_type::GI),
                gi: Some(gi),
            });
        }

        let (accession, version) = match body.rsplit_once('.') {
            Some((acc, ver)) if !ver.is_empty() && ver.bytes().all(|b| b.is_ascii_digit()) => {
                let version = ver
                    .parse::<i32>()
                    .map_err(|_| GatewayError::InvalidSeqId(format!("bad version '{ver}'")))?;
                (acc, Some(version))
            }
            _ => (body, None),
        };

        Ok(Self {
            text: trimmed.to_string(),
            accession: accession.to_ascii_uppercase(),
            version,
            seq_id_type,
            gi: None,
        })
    }

    /// True when the request is a bare GI
    #[must_use]
    pub fn is_gi(&self) -> bool {
        self.gi.is_some() && self.seq_id_type == Some(seq_id_type::GI)
    }
}

/// Bitmask of populated [`BioseqInfo`] fields
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeInfo(u32);

impl IncludeInfo {
    pub const CANONICAL_ID: Self = Self(1 << 0);
    pub const SEQ_IDS: Self = Self(1 << 1);
    pub const MOL_TYPE: Self = Self(1 << 2);
    pub const LENGTH: Self = Self(1 << 3);
    pub const STATE: Self = Self(1 << 4);
    pub const BLOB_ID: Self = Self(1 << 5);
    pub const TAX_ID: Self = Self(1 << 6);
    pub const HASH: Self = Self(1 << 7);
    pub const DATE_CHANGED: Self = Self(1 << 8);
    pub const GI: Self = Self(1 << 9);
    pub const ALL: Self = Self((1 << 10) - 1);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Fields present in both masks
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl BitOr for IncludeInfo {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for IncludeInfo {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Resolved sequence record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BioseqInfo {
    /// Identifier the record was requested by
    pub request_id: String,
    pub canonical: CanonicalSeqId,
    pub mol: i8,
    pub length: i64,
    /// Own state of the record
    pub state: i8,
    /// State inherited through the chain of inclusion
    pub seq_state: i8,
    pub tax_id: i32,
    pub hash: i32,
    pub date_changed: i64,
    /// Equivalent identifiers as `(seq_id_type, text)`
    pub seq_ids: BTreeSet<(i16, String)>,
    /// Packed blob identifier, `sat.sat_key`
    pub blob_id: String,
    pub include: IncludeInfo,
}

impl BioseqInfo {
    /// Merge the fields `newer` carries into `self`
    pub fn update(&mut self, newer: &BioseqInfo) {
        let inc = newer.include;
        if inc.contains(IncludeInfo::CANONICAL_ID) {
            self.canonical.accession.clone_from(&newer.canonical.accession);
            self.canonical.version = newer.canonical.version;
            self.canonical.seq_id_type = newer.canonical.seq_id_type;
        }
        if inc.contains(IncludeInfo::GI) {
            self.canonical.gi = newer.canonical.gi;
        }
        if inc.contains(IncludeInfo::SEQ_IDS) {
            self.seq_ids.clone_from(&newer.seq_ids);
        }
        if inc.contains(IncludeInfo::MOL_TYPE) {
            self.mol = newer.mol;
        }
        if inc.contains(IncludeInfo::LENGTH) {
            self.length = newer.length;
        }
        if inc.contains(IncludeInfo::STATE) {
            self.state = newer.state;
            self.seq_state = newer.seq_state;
        }
        if inc.contains(IncludeInfo::BLOB_ID) {
            self.blob_id.clone_from(&newer.blob_id);
        }
        if inc.contains(IncludeInfo::TAX_ID) {
            self.tax_id = newer.tax_id;
        }
        if inc.contains(IncludeInfo::HASH) {
            self.hash = newer.hash;
        }
        if inc.contains(IncludeInfo::DATE_CHANGED) {
            self.date_changed = newer.date_changed;
        }
        self.include |= inc;
    }

    /// Parse the packed blob identifier, if any
    #[must_use]
    pub fn blob(&self) -> Option<BlobId> {
        if self.blob_id.is_empty() {
            return None;
        }
        self.blob_id.parse().ok()
    }
}

/// Partition (`sat`) plus in-partition key (`sat_key`)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{sat}.{sat_key}")]
pub struct BlobId {
    pub sat: i32,
    pub sat_key: i32,
}

impl BlobId {
    #[must_use]
    pub const fn new(sat: i32, sat_key: i32) -> Self {
        Self { sat, sat_key }
    }
}

impl FromStr for BlobId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sat, sat_key) = s
            .split_once('.')
            .ok_or_else(|| GatewayError::InvalidBlobId(s.to_string()))?;
        let sat = sat
            .parse::<i32>()
            .map_err(|_| GatewayError::InvalidBlobId(s.to_string()))?;
        let sat_key = sat_key
            .parse::<i32>()
            .map_err(|_| GatewayError::InvalidBlobId(s.to_string()))?;
        if sat < 0 {
            return Err(GatewayError::InvalidBlobId(s.to_string()));
        }
        Ok(Self { sat, sat_key })
    }
}

/// Blob properties
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub blob_id: BlobId,
    /// Last modification time in milliseconds since the epoch
    pub last_modified: i64,
    pub flags: i64,
    pub size: i64,
    pub size_unpacked: i64,
    pub n_chunks: i32,
    /// Split-info marker; non-empty means the blob is split into sub-blobs
    pub id2_info: String,
}

impl BlobInfo {
    /// Blob version derived from the modification time
    #[must_use]
    pub fn version(&self) -> i64 {
        self.last_modified / BLOB_VERSION_DIVISOR_MS
    }

    #[must_use]
    pub fn is_split(&self) -> bool {
        !self.id2_info.is_empty()
    }
}

/// Secondary seq-id to canonical seq-id mapping
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Si2CsiRecord {
    pub sec_seq_id: String,
    pub sec_seq_id_type: i16,
    pub canonical: CanonicalSeqId,
}

/// One named-annotation record as stored by the database
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAnnotRecord {
    pub annot_name: String,
    pub accession: String,
    pub version: i32,
    pub seq_id_type: i16,
    pub blob_id: BlobId,
    pub last_modified: i64,
    pub start: i32,
    pub stop: i32,
    /// Opaque serialized annotation info
    pub annot_info: Bytes,
}

/// Named annotations for a set of seq-ids
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotInfo {
    pub name: String,
    pub seq_ids: BTreeSet<String>,
    pub records: Vec<NamedAnnotRecord>,
}

/// CDD annotation records for one sequence
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CddInfo {
    pub records: Vec<NamedAnnotRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(include: IncludeInfo) -> BioseqInfo {
        BioseqInfo {
            request_id: "NC_000001".to_string(),
            canonical: CanonicalSeqId::new("NC_000001", 11, seq_id_type::OTHER, 0),
            mol: 0,
            length: 0,
            state: 0,
            seq_state: 0,
            tax_id: 0,
            hash: 0,
            date_changed: 0,
            seq_ids: BTreeSet::new(),
            blob_id: String::new(),
            include,
        }
    }

    #[test]
    fn test_parse_accession_with_version() {
        let id = ParsedSeqId::parse("nc_000001.11", None).unwrap();
        assert_eq!(id.accession, "NC_000001");
        assert_eq!(id.version, Some(11));
        assert_eq!(id.seq_id_type, None);
        assert!(!id.is_gi());
    }

    #[test]
    fn test_parse_accession_without_version() {
        let id = ParsedSeqId::parse("NC_000001", Some(seq_id_type::OTHER)).unwrap();
        assert_eq!(id.accession, "NC_000001");
        assert_eq!(id.version, None);
        assert_eq!(id.seq_id_type, Some(seq_id_type::OTHER));
    }

    #[test]
    fn test_parse_gi() {
        let id = ParsedSeqId::parse("12345", None).unwrap();
        assert!(id.is_gi());
        assert_eq!(id.gi, Some(12345));

        let fasta = ParsedSeqId::parse("gi|12345", None).unwrap();
        assert_eq!(fasta.gi, Some(12345));
    }

    #[test]
    fn test_parse_fasta_tag() {
        let id = ParsedSeqId::parse("ref|NM_000546.6|", None).unwrap();
        assert_eq!(id.accession, "NM_000546");
        assert_eq!(id.version, Some(6));
        assert_eq!(id.seq_id_type, Some(seq_id_type::OTHER));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ParsedSeqId::parse("   ", None).is_err());
        assert!(ParsedSeqId::parse("xyz|ABC", None).is_err());
        assert!(ParsedSeqId::parse("AB\0C", None).is_err());
    }

    #[test]
    fn test_bioseq_update_merges_include_mask() {
        let mut base = info(IncludeInfo::CANONICAL_ID | IncludeInfo::LENGTH);
        base.length = 100;

        let mut newer = info(IncludeInfo::TAX_ID | IncludeInfo::BLOB_ID);
        newer.tax_id = 9606;
        newer.blob_id = "4.12345".to_string();
        newer.length = 999;

        base.update(&newer);
        assert_eq!(base.tax_id, 9606);
        assert_eq!(base.blob(), Some(BlobId::new(4, 12345)));
        // LENGTH was not in the newer mask
        assert_eq!(base.length, 100);
        assert!(base.include.contains(IncludeInfo::TAX_ID | IncludeInfo::LENGTH));
    }

    #[test]
    fn test_blob_id_roundtrip() {
        let id: BlobId = "4.12345".parse().unwrap();
        assert_eq!(id, BlobId::new(4, 12345));
        assert_eq!(id.to_string(), "4.12345");
        assert!("4".parse::<BlobId>().is_err());
        assert!("a.b".parse::<BlobId>().is_err());
    }

    #[test]
    fn test_blob_version() {
        let blob = BlobInfo {
            blob_id: BlobId::new(1, 42),
            last_modified: 1_500_000_123_456,
            flags: 0,
            size: 0,
            size_unpacked: 0,
            n_chunks: 1,
            id2_info: String::new(),
        };
        assert_eq!(blob.version(), 1_500_000_123_456 / 60_000);
        assert!(!blob.is_split());
    }
}
