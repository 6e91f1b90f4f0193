use tracing::warn;

use super::{CitationRecord, NOT_AVAILABLE, QueryResult};
use crate::knowledge_base::types::RawUpstreamResponse;

/// Flattens citation groups into one record per retrieved reference,
/// keeping upstream order. Missing fields become [`NOT_AVAILABLE`].
pub fn extract_query_result(response: RawUpstreamResponse) -> QueryResult {
    let answer = response.output.and_then(|o| o.text).unwrap_or_else(|| {
        warn!("upstream returned no answer text");
        NOT_AVAILABLE.to_string()
    });

    let citations = response
        .citations
        .unwrap_or_default()
        .into_iter()
        .flat_map(|group| group.retrieved_references.unwrap_or_default())
        .map(|reference| CitationRecord {
            content_snippet: reference
                .content
                .and_then(|c| c.text)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            source_uri: reference
                .location
                .and_then(|l| l.s3_location)
                .and_then(|s3| s3.uri)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        })
        .collect();

    QueryResult { answer, citations }
}
