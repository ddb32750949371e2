use std::time::Duration;

use futures::future::join_all;
use tracing::debug;

use crate::http::{HttpTransport, PreparedRequest};
use crate::models::Session;

/// Open pooled connections to the target with throwaway GETs, then settle.
///
/// Best-effort: failures are ignored. Returns how many warm-up requests got
/// any reply at all.
pub async fn warm_up(
    transport: &dyn HttpTransport,
    url: &str,
    session: &Session,
    count: usize,
    settle: Duration,
) -> usize {
    if count == 0 {
        return 0;
    }

    let request = PreparedRequest::get(url).with_session(session);
    let replies = join_all((0..count).map(|_| transport.send(&request))).await;
    let answered = replies.iter().filter(|r| r.is_ok()).count();
    debug!(url = %url, sent = count, answered, "Connection warm-up complete");

    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    answered
}
