use std::collections::HashSet;

use axum::extract::ws::Message;

use super::Event;
use crate::ws::ConnectionTable;

/// Outcome counts of one dispatch. Informational only: dispatch never fails.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    /// Resolved IDs with no local connection (other process, or just closed).
    pub missed: usize,
    /// Local connections whose writer had already shut down.
    pub failed: usize,
}

/// Push `frame` to every connection in `connection_ids` held by this process.
pub fn dispatch(
    connections: &ConnectionTable,
    event: Event,
    frame: &Message,
    connection_ids: &HashSet<String>,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for connection_id in connection_ids {
        let Some(handle) = connections.get(connection_id) else {
            report.missed += 1;
            tracing::debug!(
                connection_id = %connection_id,
                event = event.as_str(),
                "Connection not held by this process"
            );
            continue;
        };

        match handle.send(frame.clone()) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    connection_id = %connection_id,
                    identity = %handle.identity(),
                    event = event.as_str(),
                    error = %e,
                    "Failed to push event to connection"
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::ConnectionHandle;
    use tokio::sync::mpsc;

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sends_to_present_and_skips_missing() {
        let table = ConnectionTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        table.put("c1", ConnectionHandle::new("321", tx));

        let frame = Message::Text("payload".into());
        let report = dispatch(&table, Event::Message, &frame, &ids(&["c1", "elsewhere"]));

        assert_eq!(
            report,
            DispatchReport {
                sent: 1,
                missed: 1,
                failed: 0
            }
        );
        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));
    }

    #[test]
    fn test_failed_send_does_not_stop_siblings() {
        let table = ConnectionTable::new();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        table.put("dead", ConnectionHandle::new("1", dead_tx));
        table.put("live", ConnectionHandle::new("1", live_tx));

        let frame = Message::Text("payload".into());
        let report = dispatch(&table, Event::Notification, &frame, &ids(&["dead", "live"]));

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_no_connections_means_no_sends() {
        let table = ConnectionTable::new();
        let frame = Message::Text("payload".into());
        let report = dispatch(&table, Event::Message, &frame, &HashSet::new());
        assert_eq!(report, DispatchReport::default());
    }
}
