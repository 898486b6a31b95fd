//! Item request model

use serde::{Deserialize, Serialize};

/// One item the caller wants to receive values for
///
/// The client handle is the identity of the request: replies from the
/// server are correlated back to the request by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRequest {
    /// Caller-chosen handle used to correlate replies
    pub client_handle: String,
    /// Name of the item on the server
    pub item_name: String,
}

impl ItemRequest {
    /// Create a new item request
    pub fn new(client_handle: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            client_handle: client_handle.into(),
            item_name: item_name.into(),
        }
    }

    /// Create a request that uses the item name as its own client handle
    pub fn from_name(item_name: impl Into<String>) -> Self {
        let item_name = item_name.into();
        Self {
            client_handle: item_name.clone(),
            item_name,
        }
    }
}

/// Build one request per item name, each using the name as its handle
pub fn make_requests<I, S>(item_names: I) -> Vec<ItemRequest>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    item_names.into_iter().map(ItemRequest::from_name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_requests_uses_name_as_handle() {
        let requests = make_requests(["Temp.Value", "Pressure.Value"]);

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], ItemRequest::new("Temp.Value", "Temp.Value"));
        assert_eq!(requests[1].client_handle, "Pressure.Value");
    }
}
