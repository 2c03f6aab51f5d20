use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::graph::FlowGraph;
use crate::ir::StatusUpdate;
use crate::status::Status;
use crate::view::GraphView;

/// Where status updates come from, e.g. an executor endpoint.
#[allow(async_fn_in_trait)]
pub trait UpdateSource {
    type Error: Display;

    /// Fetches changes newer than `last_update_time`; `0` asks for the
    /// full state. `Ok(None)` means nothing changed.
    async fn fetch_update(&mut self, last_update_time: i64) -> Result<Option<StatusUpdate>, Self::Error>;
}

/// Hands out a fixed list of updates in order, then reports no change.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    updates: VecDeque<StatusUpdate>,
    requests: Vec<i64>,
    cancel_on_drain: Option<CancellationToken>,
}

impl ReplaySource {
    pub fn new(updates: impl IntoIterator<Item = StatusUpdate>) -> Self {
        Self {
            updates: updates.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Cancels `token` the first time a fetch finds the list empty.
    pub fn cancel_on_drain(mut self, token: CancellationToken) -> Self {
        self.cancel_on_drain = Some(token);
        self
    }

    /// `last_update_time` of every fetch so far.
    pub fn requests(&self) -> &[i64] {
        &self.requests
    }

    pub fn remaining(&self) -> usize {
        self.updates.len()
    }
}

impl UpdateSource for ReplaySource {
    type Error = Infallible;

    async fn fetch_update(&mut self, last_update_time: i64) -> Result<Option<StatusUpdate>, Self::Error> {
        self.requests.push(last_update_time);
        let next = self.updates.pop_front();
        if next.is_none()
            && let Some(token) = &self.cancel_on_drain
        {
            token.cancel();
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The flow reached a terminal status and the final refresh ran.
    Finished,
    Cancelled,
}

/// Fetches updates on a status-driven schedule until the flow finishes.
pub struct Poller {
    config: PollConfig,
    cancel: CancellationToken,
    last_update_time: i64,
    applied: usize,
}

impl Poller {
    pub fn new(config: PollConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            last_update_time: 0,
            applied: 0,
        }
    }

    /// `updateTime` of the newest update merged so far.
    pub fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    /// Number of updates merged into the view.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Sleep before the next fetch for a flow in `status`.
    pub fn interval_for(&self, status: Status) -> Duration {
        if status.is_pending() {
            self.config.pending_interval()
        } else if status == Status::Killing {
            self.config.killing_interval()
        } else {
            self.config.running_interval()
        }
    }

    /// Polls until the flow finishes or the token is cancelled.
    pub async fn run<S: UpdateSource>(&mut self, view: &mut GraphView, source: &mut S) -> PollOutcome {
        self.last_update_time = view.graph().node(FlowGraph::root()).update_time;
        if flow_status(view).is_terminal() {
            debug!("flow already finished, nothing to poll");
            return PollOutcome::Finished;
        }
        info!(since = self.last_update_time, "status polling started");

        loop {
            if !self.fetch(view, source, self.last_update_time).await {
                return self.cancelled();
            }

            let status = flow_status(view);
            if status.is_terminal() {
                info!(status = %status, "flow finished, running final refresh");
                if !self.wait(self.config.final_delay()).await || !self.fetch(view, source, 0).await {
                    return self.cancelled();
                }
                return PollOutcome::Finished;
            }

            if !self.wait(self.interval_for(status)).await {
                return self.cancelled();
            }
        }
    }

    fn cancelled(&self) -> PollOutcome {
        info!("status polling cancelled");
        PollOutcome::Cancelled
    }

    /// Returns false when cancelled before the delay elapsed.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// One fetch-and-merge round. Transport problems are reported to the
    /// view and do not stop the loop; returns false only on cancellation.
    async fn fetch<S: UpdateSource>(&mut self, view: &mut GraphView, source: &mut S, since: i64) -> bool {
        let timeout = self.config.fetch_timeout();
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            fetched = tokio::time::timeout(timeout, source.fetch_update(since)) => fetched,
        };

        match fetched {
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "status fetch timed out");
                view.notify_transport(format!("status fetch timed out after {timeout:?}"));
            }
            Ok(Err(err)) => {
                warn!(error = %err, "status fetch failed");
                view.notify_transport(err.to_string());
            }
            Ok(Ok(None)) => debug!(since, "no status change"),
            Ok(Ok(Some(update))) => match update.update_time {
                Some(update_time) => {
                    let report = view.apply_update(&update);
                    self.last_update_time = update_time;
                    self.applied += 1;
                    debug!(
                        update_time,
                        changed = report.changed.len(),
                        skipped = report.skipped.len(),
                        "status update merged"
                    );
                }
                None => debug!(since, "update without updateTime ignored"),
            },
        }
        true
    }
}

fn flow_status(view: &GraphView) -> Status {
    view.graph().node(FlowGraph::root()).status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ir::parse_flow;
    use crate::text_metrics::FixedMetrics;
    use crate::view::ViewEvent;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::time::Instant;

    fn view(status: &str) -> GraphView {
        let data = parse_flow(&format!(
            r#"{{
                "flowId": "nightly",
                "status": "{status}",
                "updateTime": 100,
                "nodes": [
                    {{"id": "a", "type": "command"}},
                    {{"id": "b", "type": "command", "in": ["a"]}}
                ]
            }}"#
        ))
        .unwrap();
        let graph = FlowGraph::from_data(&data).unwrap();
        GraphView::new(graph, &Config::default(), Box::new(FixedMetrics::default())).unwrap()
    }

    fn update(status: Status, update_time: Option<i64>, nodes: Vec<StatusUpdate>) -> StatusUpdate {
        StatusUpdate {
            status: Some(status),
            update_time,
            nodes,
            ..Default::default()
        }
    }

    fn poller() -> Poller {
        Poller::new(PollConfig::default(), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_finished_then_refreshes_once() {
        let mut view = view("RUNNING");
        let mut source = ReplaySource::new([
            update(Status::Running, Some(110), vec![StatusUpdate::for_node("a", Status::Succeeded)]),
            update(Status::Succeeded, Some(120), vec![StatusUpdate::for_node("b", Status::Succeeded)]),
        ]);
        let mut poller = poller();
        let start = Instant::now();

        assert_eq!(poller.run(&mut view, &mut source).await, PollOutcome::Finished);

        assert_eq!(source.requests(), &[100, 110, 0]);
        assert_eq!(poller.applied(), 2);
        assert_eq!(poller.last_update_time(), 120);
        assert_eq!(start.elapsed(), Duration::from_millis(5_500));
        let b = view.graph().find("b").unwrap();
        assert_eq!(view.graph().node(b).status, Status::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_flow_is_not_polled() {
        let mut view = view("KILLED");
        let mut source = ReplaySource::new([]);
        assert_eq!(poller().run(&mut view, &mut source).await, PollOutcome::Finished);
        assert!(source.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_and_killing_use_their_own_intervals() {
        let mut poller = poller();
        assert_eq!(poller.interval_for(Status::Preparing), Duration::from_secs(1));
        assert_eq!(poller.interval_for(Status::Killing), Duration::from_secs(30));
        assert_eq!(poller.interval_for(Status::Running), Duration::from_secs(5));

        let mut view = view("PREPARING");
        let mut source = ReplaySource::new([
            update(Status::Preparing, Some(101), vec![]),
            update(Status::Failed, Some(102), vec![]),
        ]);
        let start = Instant::now();
        poller.run(&mut view, &mut source).await;
        // One pending second, then the final delay.
        assert_eq!(start.elapsed(), Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn updates_without_time_count_as_no_change() {
        let mut view = view("RUNNING");
        let mut source = ReplaySource::new([
            update(Status::Succeeded, None, vec![]),
            update(Status::Succeeded, Some(130), vec![]),
        ]);
        let mut poller = poller();
        poller.run(&mut view, &mut source).await;
        assert_eq!(source.requests(), &[100, 100, 0]);
        assert_eq!(poller.applied(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let mut view = view("RUNNING");
        let token = CancellationToken::new();
        let mut source = ReplaySource::new([]).cancel_on_drain(token.clone());
        let mut poller = Poller::new(PollConfig::default(), token);

        assert_eq!(poller.run(&mut view, &mut source).await, PollOutcome::Cancelled);
        assert_eq!(source.requests(), &[100]);
    }

    struct StallingSource {
        calls: usize,
    }

    impl UpdateSource for StallingSource {
        type Error = String;

        async fn fetch_update(&mut self, _since: i64) -> Result<Option<StatusUpdate>, String> {
            self.calls += 1;
            match self.calls {
                1 => std::future::pending().await,
                2 => Err("connection reset".to_string()),
                _ => Ok(Some(update(Status::Succeeded, Some(200), vec![]))),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_reported_and_retried() {
        let mut view = view("RUNNING");
        let notices = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&notices);
        view.subscribe(move |event| {
            if let ViewEvent::TransportNotice(message) = event {
                sink.borrow_mut().push(message.clone());
            }
        });
        let mut source = StallingSource { calls: 0 };
        let start = Instant::now();

        assert_eq!(poller().run(&mut view, &mut source).await, PollOutcome::Finished);

        // Timed out fetch, two running intervals, final delay.
        assert_eq!(start.elapsed(), Duration::from_millis(10_000 + 5_000 + 5_000 + 500));
        let notices = notices.borrow();
        assert_eq!(notices.len(), 2);
        assert!(notices[0].contains("timed out"));
        assert_eq!(notices[1], "connection reset");
    }
}
