//! Change subscriptions over polling.
//!
//! A subscription owns one tokio task that periodically asks a table for
//! rows from the last cursor value it has delivered on, and hands each new
//! row to the subscriber once. Rows at the cursor value itself are told
//! apart by their `id`. Delivery is "eventually observed":
//! a failed poll is logged and simply retried on the next tick.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Params};
use crate::utils::parse_timestamp;

/// Buffered events per subscription before the poller waits on the reader.
const CHANNEL_CAPACITY: usize = 64;

/// Rows requested per poll. A page that stops inside a run of equal cursor
/// values is finished by the next, inclusive poll; a single run longer than
/// this cannot be read past.
const POLL_PAGE_SIZE: usize = 200;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What to watch.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub table: &'static str,
    /// Extra PostgREST filters, e.g. `("direction", "eq.inbound")`.
    pub filter: Params,
    /// Monotonic column used as the cursor, usually a timestamp.
    pub cursor_column: &'static str,
    pub interval: Duration,
    /// Deliver rows after this cursor value. `None` starts from now.
    pub start_after: Option<String>,
}

impl SubscriptionRequest {
    pub fn new(table: &'static str, cursor_column: &'static str) -> Self {
        Self {
            table,
            filter: Vec::new(),
            cursor_column,
            interval: DEFAULT_POLL_INTERVAL,
            start_after: None,
        }
    }

    pub fn filter(mut self, column: &'static str, condition: impl Into<String>) -> Self {
        self.filter.push((column, condition.into()));
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn start_after(mut self, cursor: impl Into<String>) -> Self {
        self.start_after = Some(cursor.into());
        self
    }

    /// Query for rows from `cursor` on. `inclusive` re-reads rows at the
    /// cursor itself, for when a page may have stopped partway through them.
    fn params(&self, cursor: &str, inclusive: bool) -> Params {
        let op = if inclusive { "gte" } else { "gt" };
        let mut params = self.filter.clone();
        params.push(("select", "*".to_string()));
        params.push((self.cursor_column, format!("{}.{}", op, cursor)));
        params.push(("order", format!("{}.asc", self.cursor_column)));
        params.push(("limit", POLL_PAGE_SIZE.to_string()));
        params
    }
}

/// A row observed by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    pub row: T,
    pub cursor: String,
}

/// Live subscription. Dropping it stops the poller.
pub struct Subscription<T> {
    receiver: mpsc::Receiver<ChangeEvent<T>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Wait for the next change. Returns `None` once the poller has stopped.
    pub async fn recv(&mut self) -> Option<ChangeEvent<T>> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Entry point for subscriptions against one backend.
#[derive(Clone)]
pub struct ChangeFeed {
    api: ApiClient,
}

impl ChangeFeed {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Start polling. Must be called inside a tokio runtime.
    pub fn subscribe<T>(&self, request: SubscriptionRequest) -> Subscription<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let api = self.api.clone();
        let task = tokio::spawn(poll_loop(api, request, sender));
        Subscription { receiver, task }
    }
}

async fn poll_loop<T>(api: ApiClient, request: SubscriptionRequest, sender: mpsc::Sender<ChangeEvent<T>>)
where
    T: DeserializeOwned + Send + 'static,
{
    let mut cursor = request
        .start_after
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339());
    let mut seen = HashSet::new();
    let mut ticker = tokio::time::interval(request.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(table = request.table, cursor = %cursor, "Subscription started");

    loop {
        ticker.tick().await;

        let params = request.params(&cursor, !seen.is_empty());
        let rows: Vec<Value> = match api.select(request.table, &params).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = request.table, error = %e, "Poll failed, retrying next tick");
                continue;
            }
        };

        let step = advance(rows, request.cursor_column, &cursor, &seen);
        cursor = step.cursor;
        seen = step.seen;

        for (value, row_cursor) in step.fresh {
            let row = match serde_json::from_value::<T>(value) {
                Ok(row) => row,
                Err(e) => {
                    warn!(table = request.table, error = %e, "Skipping undecodable row");
                    continue;
                }
            };
            if sender
                .send(ChangeEvent {
                    row,
                    cursor: row_cursor,
                })
                .await
                .is_err()
            {
                debug!(table = request.table, "Subscriber gone, stopping");
                return;
            }
        }
    }
}

fn cursor_value(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// True when `candidate` is past `current`, comparing as timestamps or
/// numbers when both sides parse and as text otherwise.
pub fn is_after(candidate: &str, current: &str) -> bool {
    if let (Some(a), Some(b)) = (parse_timestamp(candidate), parse_timestamp(current)) {
        return a > b;
    }
    if let (Ok(a), Ok(b)) = (candidate.parse::<f64>(), current.parse::<f64>()) {
        return a > b;
    }
    candidate > current
}

/// Identity of a row for boundary bookkeeping: its `id`, or the whole row.
fn row_key(row: &Value) -> String {
    match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => row.to_string(),
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    /// Rows not delivered before, with their cursor values
    pub fresh: Vec<(Value, String)>,
    /// Greatest cursor value delivered so far
    pub cursor: String,
    /// Keys of delivered rows whose cursor equals `cursor`
    pub seen: HashSet<String>,
}

/// Pick out undelivered rows and move the cursor to the greatest value seen.
///
/// Rows past `cursor` are new. Rows exactly at `cursor` are new only when
/// some rows at that value were already delivered (`seen` is non-empty) and
/// this one is not among them; this picks up the rest of a group of equal
/// cursor values that a page limit cut in half. Rows without a readable
/// cursor value are dropped since they could never be positioned against
/// later polls.
pub fn advance(rows: Vec<Value>, column: &str, cursor: &str, seen: &HashSet<String>) -> Advance {
    let mut greatest = cursor.to_string();
    let mut moved = false;
    let mut fresh = Vec::new();

    for row in rows {
        let Some(value) = cursor_value(&row, column) else {
            continue;
        };
        let is_new = if is_after(&value, cursor) {
            true
        } else {
            let at_cursor = !is_after(cursor, &value);
            at_cursor && !seen.is_empty() && !seen.contains(&row_key(&row))
        };
        if !is_new {
            continue;
        }
        if is_after(&value, &greatest) {
            greatest = value.clone();
            moved = true;
        }
        fresh.push((row, value));
    }

    let mut next_seen = if moved { HashSet::new() } else { seen.clone() };
    for (row, value) in &fresh {
        if !is_after(&greatest, value) {
            next_seen.insert(row_key(row));
        }
    }

    Advance {
        fresh,
        cursor: greatest,
        seen: next_seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn none() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_advance_moves_cursor_to_greatest() {
        let rows = vec![
            json!({"id": "1", "created_at": "2024-06-01T10:00:01Z"}),
            json!({"id": "2", "created_at": "2024-06-01T10:00:03Z"}),
            json!({"id": "3", "created_at": "2024-06-01T10:00:02Z"}),
        ];
        let step = advance(rows, "created_at", "2024-06-01T10:00:00Z", &none());
        assert_eq!(step.fresh.len(), 3);
        assert_eq!(step.cursor, "2024-06-01T10:00:03Z");
        assert_eq!(step.seen, HashSet::from(["2".to_string()]));
    }

    #[test]
    fn test_advance_skips_seen_rows() {
        let rows = vec![
            json!({"id": "1", "created_at": "2024-06-01T10:00:00Z"}),
            json!({"id": "2", "created_at": "2024-06-01T10:00:05Z"}),
            json!({"id": "3"}),
        ];
        let step = advance(rows, "created_at", "2024-06-01T10:00:00Z", &none());
        assert_eq!(step.fresh.len(), 1);
        assert_eq!(step.fresh[0].0["id"], "2");
        assert_eq!(step.cursor, "2024-06-01T10:00:05Z");

        let again = advance(
            vec![json!({"id": "2", "created_at": "2024-06-01T10:00:05Z"})],
            "created_at",
            &step.cursor,
            &step.seen,
        );
        assert!(again.fresh.is_empty());
        assert_eq!(again.cursor, step.cursor);
        assert_eq!(again.seen, step.seen);
    }

    #[test]
    fn test_advance_picks_up_rest_of_split_page() {
        // First page stopped after one of two rows sharing a timestamp
        let first = advance(
            vec![
                json!({"id": "a", "created_at": "2024-06-01T10:00:01Z"}),
                json!({"id": "b", "created_at": "2024-06-01T10:00:02Z"}),
            ],
            "created_at",
            "2024-06-01T10:00:00Z",
            &none(),
        );
        assert_eq!(first.cursor, "2024-06-01T10:00:02Z");

        // The inclusive re-poll returns both rows at the boundary
        let second = advance(
            vec![
                json!({"id": "b", "created_at": "2024-06-01T10:00:02Z"}),
                json!({"id": "c", "created_at": "2024-06-01T10:00:02Z"}),
            ],
            "created_at",
            &first.cursor,
            &first.seen,
        );
        assert_eq!(second.fresh.len(), 1);
        assert_eq!(second.fresh[0].0["id"], "c");
        assert_eq!(second.cursor, "2024-06-01T10:00:02Z");
        assert_eq!(second.seen, HashSet::from(["b".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_advance_compares_offsets_as_instants() {
        let rows = vec![json!({"created_at": "2024-06-01T12:00:01+02:00"})];
        let step = advance(rows, "created_at", "2024-06-01T10:00:00Z", &none());
        assert_eq!(step.fresh.len(), 1);

        let rows = vec![json!({"created_at": "2024-06-01T11:00:00+02:00"})];
        let step = advance(rows, "created_at", "2024-06-01T10:00:00Z", &none());
        assert!(step.fresh.is_empty());
    }

    #[test]
    fn test_numeric_cursor() {
        let rows = vec![json!({"seq": 9}), json!({"seq": 11})];
        let step = advance(rows, "seq", "10", &none());
        assert_eq!(step.fresh.len(), 1);
        assert_eq!(step.cursor, "11");
    }

    #[test]
    fn test_request_params() {
        let request = SubscriptionRequest::new("sms_messages", "created_at")
            .filter("direction", "eq.inbound")
            .interval(Duration::from_secs(2));
        let params = request.params("2024-06-01T10:00:00Z", false);
        assert!(params.contains(&("direction", "eq.inbound".to_string())));
        assert!(params.contains(&("created_at", "gt.2024-06-01T10:00:00Z".to_string())));
        assert!(params.contains(&("order", "created_at.asc".to_string())));
        assert_eq!(request.interval, Duration::from_secs(2));

        let inclusive = request.params("2024-06-01T10:00:00Z", true);
        assert!(inclusive.contains(&("created_at", "gte.2024-06-01T10:00:00Z".to_string())));
    }

    #[tokio::test]
    async fn test_drop_aborts_poller() {
        let (_sender, receiver) = mpsc::channel::<ChangeEvent<Value>>(1);
        let (alive, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });
        let subscription = Subscription { receiver, task };
        subscription.unsubscribe();
        // The task's state is dropped on abort, closing the oneshot
        assert!(stopped.await.is_err());
    }
}
