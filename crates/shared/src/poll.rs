//! HTTP poll transport page.

use serde::{Deserialize, Serialize};

use crate::envelope::PushEvent;

/// Response of `GET /events?since=<cursor>`.
///
/// `cursor` is the value to send as `since` on the next poll; events at or below
/// the previous cursor are never repeated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventsPage {
    #[serde(default)]
    pub events: Vec<PushEvent>,
    pub cursor: u64,
}
