use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error_handling::{ConfigError, WorkFetchError};

pub const DIGEST_LEN: usize = 32;

pub type Digest = [u8; DIGEST_LEN];

/// Longest `work_id ∥ wallet_id ∥ anchor_hash` accepted from a work source.
pub const MAX_TEMPLATE_LEN: usize = 1024;

/// Difficulty threshold: a big-endian prefix a digest must not exceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(Vec<u8>);

impl Target {
    pub fn from_hex(hex_str: &str) -> Result<Self, WorkFetchError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| WorkFetchError::InvalidTarget(format!("{hex_str}: {e}")))?;
        if bytes.is_empty() || bytes.len() > DIGEST_LEN {
            return Err(WorkFetchError::InvalidTarget(format!(
                "{hex_str}: expected 1..={DIGEST_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub(crate) fn from_prefix(prefix: &[u8]) -> Self {
        debug_assert!(!prefix.is_empty() && prefix.len() <= DIGEST_LEN);
        Self(prefix.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Compares the digest's leading `len()` bytes against the target,
    /// unsigned lexicographically.
    pub fn is_met_by(&self, digest: &Digest) -> bool {
        digest[..self.0.len()] <= self.0[..]
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// The current unit of work. Replaced wholesale on refresh, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDescriptor {
    pub work_id: String,
    pub anchor_hash: String,
    pub target: Target,
}

/// Coordinator wire format for `GET /work`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResponse {
    pub work: String,
    pub poh_hash: String,
    pub target: String,
}

impl TryFrom<WorkResponse> for WorkDescriptor {
    type Error = WorkFetchError;

    fn try_from(resp: WorkResponse) -> Result<Self, Self::Error> {
        if resp.work.is_empty() {
            return Err(WorkFetchError::EmptyField("work"));
        }
        if resp.poh_hash.is_empty() {
            return Err(WorkFetchError::EmptyField("poh_hash"));
        }
        Ok(Self {
            target: Target::from_hex(&resp.target)?,
            work_id: resp.work,
            anchor_hash: resp.poh_hash,
        })
    }
}

/// `work_id ∥ wallet_id ∥ anchor_hash`; the nonce is appended per candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTemplate {
    prefix: Vec<u8>,
}

impl InputTemplate {
    pub fn new(work: &WorkDescriptor, wallet_id: &str) -> Self {
        let mut prefix =
            Vec::with_capacity(work.work_id.len() + wallet_id.len() + work.anchor_hash.len());
        prefix.extend_from_slice(work.work_id.as_bytes());
        prefix.extend_from_slice(wallet_id.as_bytes());
        prefix.extend_from_slice(work.anchor_hash.as_bytes());
        Self { prefix }
    }

    /// Like [`InputTemplate::new`], but refuses work whose template would
    /// not fit a device input buffer.
    pub fn for_work(work: &WorkDescriptor, wallet_id: &str) -> Result<Self, WorkFetchError> {
        let len = work.work_id.len() + wallet_id.len() + work.anchor_hash.len();
        if len > MAX_TEMPLATE_LEN {
            return Err(WorkFetchError::TemplateTooLarge { len, max: MAX_TEMPLATE_LEN });
        }
        Ok(Self::new(work, wallet_id))
    }

    pub fn from_bytes(prefix: impl Into<Vec<u8>>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Full hash input for one nonce (nonce as 8 big-endian bytes).
    pub fn candidate(&self, nonce: u64) -> Vec<u8> {
        let mut input = Vec::with_capacity(self.prefix.len() + 8);
        input.extend_from_slice(&self.prefix);
        input.extend_from_slice(&nonce.to_be_bytes());
        input
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashResult {
    pub nonce: u64,
    pub digest: Digest,
}

/// Coordinator wire format for `POST /submit_block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub wallet: String,
    pub nonce: u64,
    pub hash: String,
    #[serde(skip)]
    pub work_id: String,
}

impl Submission {
    pub fn new(wallet_id: &str, work_id: &str, result: &HashResult) -> Self {
        Self {
            wallet: wallet_id.to_string(),
            nonce: result.nonce,
            hash: hex::encode(result.digest),
            work_id: work_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected { status: u16, body: String },
    NetworkError(String),
}

/// Hashes per second over one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashrateSample {
    pub hashes_per_sec: f64,
}

impl HashrateSample {
    pub fn from_batch(hashes: usize, elapsed_secs: f64) -> Self {
        let hashes_per_sec = if elapsed_secs > 0.0 { hashes as f64 / elapsed_secs } else { 0.0 };
        Self { hashes_per_sec }
    }

    pub fn megahashes(&self) -> f64 {
        self.hashes_per_sec / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Gpu,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Scrypt,
    XorFold,
}

impl FromStr for Mode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Mode::Local),
            "remote" => Ok(Mode::Remote),
            _ => Err(ConfigError::InvalidEnvVar("MINER_MODE".to_string(), s.to_string())),
        }
    }
}

impl FromStr for DevicePreference {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(DevicePreference::Gpu),
            "cpu" => Ok(DevicePreference::Cpu),
            _ => Err(ConfigError::InvalidEnvVar("DEVICE_PREFERENCE".to_string(), s.to_string())),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scrypt" => Ok(HashAlgorithm::Scrypt),
            "xor-fold" | "xorfold" => Ok(HashAlgorithm::XorFold),
            _ => Err(ConfigError::InvalidEnvVar("HASH_ALGORITHM".to_string(), s.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Scrypt => f.write_str("scrypt"),
            HashAlgorithm::XorFold => f.write_str("xor-fold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(target: &str) -> WorkDescriptor {
        WorkDescriptor {
            work_id: "slot7".into(),
            anchor_hash: "poh".into(),
            target: Target::from_hex(target).unwrap(),
        }
    }

    #[test]
    fn template_over_the_limit_is_refused_as_work_error() {
        let mut w = work("00");
        assert_eq!(InputTemplate::for_work(&w, "W").unwrap(), InputTemplate::new(&w, "W"));

        w.anchor_hash = "p".repeat(MAX_TEMPLATE_LEN);
        let err = InputTemplate::for_work(&w, "W").unwrap_err();
        assert!(matches!(
            err,
            WorkFetchError::TemplateTooLarge { len: 1030, max: MAX_TEMPLATE_LEN }
        ));
    }

    #[test]
    fn all_ones_target_is_always_met() {
        let t = Target::from_hex("ffffffff").unwrap();
        assert!(t.is_met_by(&[0xff; 32]));
        assert!(t.is_met_by(&[0x00; 32]));
    }

    #[test]
    fn zero_target_only_met_by_zero_prefix() {
        let t = Target::from_hex("00000000").unwrap();
        let mut d = [0u8; 32];
        assert!(t.is_met_by(&d));
        d[3] = 1;
        assert!(!t.is_met_by(&d));
        d[3] = 0;
        d[4] = 0xff;
        assert!(t.is_met_by(&d), "only the prefix is compared");
    }

    #[test]
    fn target_compares_big_endian() {
        let t = Target::from_hex("0000ffff").unwrap();
        let mut d = [0xffu8; 32];
        d[0] = 0;
        d[1] = 0;
        assert!(t.is_met_by(&d));
        d[1] = 1;
        d[2] = 0;
        d[3] = 0;
        assert!(!t.is_met_by(&d));
    }

    #[test]
    fn target_rejects_bad_hex_and_lengths() {
        assert!(Target::from_hex("xyz").is_err());
        assert!(Target::from_hex("").is_err());
        assert!(Target::from_hex(&"ff".repeat(33)).is_err());
        assert_eq!(Target::from_hex("00FF").unwrap().to_string(), "00ff");
    }

    #[test]
    fn template_layout_is_work_wallet_anchor_nonce() {
        let tpl = InputTemplate::new(&work("ff"), "W");
        assert_eq!(tpl.as_bytes(), b"slot7Wpoh");
        let c = tpl.candidate(0x0102);
        assert_eq!(&c[..9], b"slot7Wpoh");
        assert_eq!(&c[9..], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn work_response_requires_fields() {
        let ok = WorkResponse { work: "a".into(), poh_hash: "b".into(), target: "0f".into() };
        let w = WorkDescriptor::try_from(ok).unwrap();
        assert_eq!(w.work_id, "a");
        assert_eq!(w.anchor_hash, "b");

        let empty = WorkResponse { work: String::new(), poh_hash: "b".into(), target: "0f".into() };
        assert!(matches!(
            WorkDescriptor::try_from(empty),
            Err(WorkFetchError::EmptyField("work"))
        ));
    }

    #[test]
    fn submission_serializes_wire_fields_only() {
        let r = HashResult { nonce: 42, digest: [0xab; 32] };
        let s = Submission::new("W", "slot7", &r);
        let v: serde_json::Value = serde_json::to_value(&s).unwrap();
        assert_eq!(v["wallet"], "W");
        assert_eq!(v["nonce"], 42);
        assert_eq!(v["hash"], "ab".repeat(32));
        assert!(v.get("work_id").is_none());
    }

    #[test]
    fn hashrate_handles_zero_elapsed() {
        assert_eq!(HashrateSample::from_batch(256, 0.0).hashes_per_sec, 0.0);
        let s = HashrateSample::from_batch(1_000_000, 0.5);
        assert!((s.megahashes() - 2.0).abs() < 1e-9);
    }
}
