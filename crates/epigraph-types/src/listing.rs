//! Wire types for the remote HTTP listing service.

use serde::{Deserialize, Serialize};

/// Status/message pair returned by the listing service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseCode {
    #[serde(default, rename = "code")]
    pub code: i64,
    #[serde(default, rename = "message")]
    pub message: String,
}

/// One page of the sequential file listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default, rename = "Code")]
    pub code: ResponseCode,
    #[serde(default, rename = "List")]
    pub list: Vec<ListData>,
}

/// One file entry as reported by the listing service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListData {
    pub id: String,
    #[serde(default)]
    pub expert: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub check_sum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_page() {
        let body = r#"{
            "Code": {"code": 0, "message": "ok"},
            "List": [{
                "id": "d4ae9e27",
                "expert": "f01234",
                "index": 1,
                "file_name": "seq-1.sql",
                "file_url": "http://files/d4ae9e27",
                "status": "send",
                "count": 2,
                "file_size": 1024,
                "check_sum": "ab54d286"
            }]
        }"#;
        let resp: ListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.code.code, 0);
        assert_eq!(resp.list.len(), 1);
        assert_eq!(resp.list[0].expert, "f01234");
        assert_eq!(resp.list[0].check_sum, "ab54d286");
    }

    #[test]
    fn empty_page_parses() {
        let resp: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.list.is_empty());
    }
}
