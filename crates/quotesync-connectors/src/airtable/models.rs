use quotesync_api::Fields;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

/// One page of a list or the response of a batched write.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<AirtableRecord>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewRecord<'a> {
    pub fields: &'a Fields,
}

#[derive(Debug, Serialize)]
pub struct RecordUpdate<'a> {
    pub id: &'a str,
    pub fields: &'a Fields,
}

#[derive(Debug, Serialize)]
pub struct WriteRequest<T> {
    pub records: Vec<T>,
    pub typecast: bool,
}
