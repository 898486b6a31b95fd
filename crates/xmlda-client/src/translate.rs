//! Conversion of server replies into item values
//!
//! Raw values are correlated to the caller's requests through the client
//! handle. The item name always comes from the request; the item path from
//! the raw value.

use std::collections::HashMap;

use tracing::{debug, warn};
use xmlda_core::{
    ErrorInformation, ItemRequest, ItemState, ItemValue, OpcError, PolledRefreshReply,
    RawItemValue, ReadReply, SubscribeReply,
};

/// Requests keyed by client handle
pub type HandleMap = HashMap<String, ItemRequest>;

/// Error texts keyed by result id
pub type ErrorMap = HashMap<String, String>;

/// Build a handle map; later requests shadow earlier ones with the same handle
pub fn handle_map(items: &[ItemRequest]) -> HandleMap {
    items
        .iter()
        .map(|item| (item.client_handle.clone(), item.clone()))
        .collect()
}

/// Collect the error texts of a reply
pub fn map_errors(errors: &[OpcError]) -> ErrorMap {
    errors
        .iter()
        .filter_map(|error| {
            error
                .text
                .as_ref()
                .map(|text| (error.id.clone(), text.clone()))
        })
        .collect()
}

/// Convert one raw value
pub fn convert_value(raw: &RawItemValue, item_name: &str, errors: &ErrorMap) -> ItemValue {
    let error_information = raw.result_id.as_ref().map(|code| ErrorInformation {
        code: code.clone(),
        text: errors.get(code).cloned(),
    });

    ItemValue {
        item_name: item_name.to_string(),
        item_path: raw.item_path.clone(),
        value: raw.value.clone(),
        state: ItemState::from(raw.quality.quality_field),
        timestamp: raw.timestamp,
        error_information,
    }
}

/// Values of a subscribe reply
pub fn subscribe_values(reply: &SubscribeReply, handles: &HandleMap) -> HashMap<String, ItemValue> {
    let errors = map_errors(&reply.errors);
    let mut values = HashMap::with_capacity(reply.items.len());
    collect(
        &mut values,
        reply.items.iter().map(|item| &item.item_value),
        handles,
        &errors,
    );
    values
}

/// Values of a polled refresh reply
///
/// All item lists are merged; on a handle collision the later list wins.
pub fn refresh_values(
    reply: &PolledRefreshReply,
    handles: &HandleMap,
) -> HashMap<String, ItemValue> {
    let errors = map_errors(&reply.errors);
    let mut values = HashMap::new();
    for list in &reply.item_lists {
        debug!(count = list.items.len(), "Items in reply");
        collect(&mut values, list.items.iter(), handles, &errors);
    }
    values
}

/// Values of a read reply
pub fn read_values(reply: &ReadReply, handles: &HandleMap) -> HashMap<String, ItemValue> {
    let errors = map_errors(&reply.errors);
    let mut values = HashMap::with_capacity(reply.items.len());
    collect(&mut values, reply.items.iter(), handles, &errors);
    values
}

fn collect<'a>(
    values: &mut HashMap<String, ItemValue>,
    raw_values: impl Iterator<Item = &'a RawItemValue>,
    handles: &HandleMap,
    errors: &ErrorMap,
) {
    for raw in raw_values {
        match handles.get(&raw.client_item_handle) {
            Some(request) => {
                let value = convert_value(raw, &request.item_name, errors);
                values.insert(raw.client_item_handle.clone(), value);
            }
            None => {
                warn!(
                    client_handle = %raw.client_item_handle,
                    "Server returned a value for an unknown client handle"
                );
            }
        }
    }
}
