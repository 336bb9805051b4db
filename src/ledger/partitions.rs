/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> EnrichmentJob (JSON)
/// - `stocks`: stock:{stock_code} -> StockDetails (JSON)
/// - `pending`: enr:{enrichment_id} -> PendingEnrichment (JSON)
/// - `metadata`: meta:{key} -> value (string)

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Decode a job key: job:{job_id} -> job_id
pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

/// Encode a stock key: stock:{stock_code}
pub fn encode_stock_key(stock_code: &str) -> Vec<u8> {
    format!("stock:{}", stock_code).into_bytes()
}

/// Encode a pending-enrichment key: enr:{enrichment_id}
pub fn encode_pending_key(enrichment_id: &str) -> Vec<u8> {
    format!("enr:{}", enrichment_id).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
