use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The two recognized upload kinds. Each maps to its own storage prefix so
/// that jobs of different kinds can never collide in the bucket keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadCategory {
    Founder,
    Pitch,
}

impl UploadCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "founder" => Some(UploadCategory::Founder),
            "pitch" => Some(UploadCategory::Pitch),
            _ => None,
        }
    }

    pub fn storage_prefix(&self) -> &'static str {
        match self {
            UploadCategory::Founder => "founder-videos",
            UploadCategory::Pitch => "pitch-videos",
        }
    }

    /// Pitch uploads carry a second correlating id; founder uploads do not.
    pub fn requires_pitch_id(&self) -> bool {
        matches!(self, UploadCategory::Pitch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCategory::Founder => "founder",
            UploadCategory::Pitch => "pitch",
        }
    }
}

/// Key of a single uploaded chunk. Pure function of its inputs: repeated
/// grants for the same (job, index) always target the same object, which is
/// what makes grant retries idempotent (last physical write wins).
pub fn chunk_key(category: UploadCategory, job_id: &str, chunk_index: u32) -> String {
    format!(
        "{}/{}/chunks/{}",
        category.storage_prefix(),
        job_id,
        chunk_index
    )
}

/// Prefix under which all chunks of a job live. Handed to the merge worker so
/// it can list and concatenate them.
pub fn chunk_prefix(category: UploadCategory, job_id: &str) -> String {
    format!("{}/{}/chunks/", category.storage_prefix(), job_id)
}

/// Key of the status record the merge worker writes exactly once. Readers
/// poll this object; its absence means "not started or still processing".
pub fn status_key(category: UploadCategory, job_id: &str) -> String {
    format!("{}/{}/status.json", category.storage_prefix(), job_id)
}

/// Key of the merged output object.
pub fn output_key(category: UploadCategory, job_id: &str, filename: &str) -> String {
    format!("{}/{}/{}", category.storage_prefix(), job_id, filename)
}

/// Descriptor submitted to the merge worker as the invocation payload. The
/// worker owns everything after this point: it reads the chunks, writes the
/// merged object and finally the status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeJob {
    pub category: UploadCategory,
    pub job_id: String,
    pub scout_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_id: Option<String>,
    pub filename: String,
    pub mime_type: String,
    pub total_chunks: u32,
    pub chunk_prefix: String,
    pub output_key: String,
    pub status_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_is_deterministic() {
        let a = chunk_key(UploadCategory::Founder, "abc", 3);
        let b = chunk_key(UploadCategory::Founder, "abc", 3);
        assert_eq!(a, b);
        assert_eq!(a, "founder-videos/abc/chunks/3");
    }

    #[test]
    fn chunk_keys_are_distinct_per_index() {
        let keys: Vec<String> = (0..10)
            .map(|i| chunk_key(UploadCategory::Pitch, "job-1", i))
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn chunk_keys_are_distinct_per_job() {
        let a = chunk_key(UploadCategory::Founder, "job-a", 0);
        let b = chunk_key(UploadCategory::Founder, "job-b", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn categories_never_share_a_prefix() {
        let a = chunk_key(UploadCategory::Founder, "same-job", 0);
        let b = chunk_key(UploadCategory::Pitch, "same-job", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn status_key_per_category() {
        assert_eq!(
            status_key(UploadCategory::Founder, "abc"),
            "founder-videos/abc/status.json"
        );
        assert_eq!(
            status_key(UploadCategory::Pitch, "abc"),
            "pitch-videos/abc/status.json"
        );
    }

    #[test]
    fn parse_rejects_unknown_categories() {
        assert_eq!(
            UploadCategory::parse("founder"),
            Some(UploadCategory::Founder)
        );
        assert_eq!(UploadCategory::parse("pitch"), Some(UploadCategory::Pitch));
        assert_eq!(UploadCategory::parse("video"), None);
        assert_eq!(UploadCategory::parse(""), None);
    }
}
