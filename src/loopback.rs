/// In-process transports
///
/// `LoopbackTransport` and `LoopbackAdmin` hand the dispatch loop whatever
/// events are injected into them and record every request a channel makes.
/// Share one behind an `Arc` to drive a channel from the same process.

use crate::protocol::{AdminReply, LinkState, RawEvent};
use crate::transport::{AdminCommand, AdminTransport, Transport, TransportError, TransportResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Stream request observed by a loopback transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    Open {
        service: String,
        ticker: String,
        request_id: u32,
    },
    Close {
        service: String,
        ticker: String,
    },
    OpenBroadcast {
        service: String,
        bds: String,
        request_id: u32,
    },
    CloseBroadcast {
        service: String,
        bds: String,
    },
}

#[derive(Debug, Default)]
struct LoopbackState {
    connected: bool,
    endpoint: String,
    connect_error: Option<String>,
    reject_requests: bool,
    connects: usize,
    queue: VecDeque<RawEvent>,
    requests: Vec<StreamRequest>,
}

#[derive(Debug, Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    ready: Condvar,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        LoopbackTransport::default()
    }

    /// Make every following `connect` fail with `reason`.
    pub fn fail_connect(&self, reason: &str) {
        self.state.lock().connect_error = Some(reason.to_string());
    }

    /// While set, every stream open/close fails with `TransportError::Closed`.
    pub fn reject_requests(&self, reject: bool) {
        self.state.lock().reject_requests = reject;
    }

    pub fn inject(&self, event: RawEvent) {
        let mut st = self.state.lock();
        st.queue.push_back(event);
        self.ready.notify_all();
    }

    pub fn inject_all(&self, events: impl IntoIterator<Item = RawEvent>) {
        let mut st = self.state.lock();
        st.queue.extend(events);
        self.ready.notify_all();
    }

    /// Events not yet polled
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.state.lock().requests.clone()
    }

    pub fn take_requests(&self) -> Vec<StreamRequest> {
        std::mem::take(&mut self.state.lock().requests)
    }

    /// Successful connects so far
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn endpoint(&self) -> String {
        self.state.lock().endpoint.clone()
    }

    fn request(&self, req: StreamRequest) -> TransportResult<()> {
        let mut st = self.state.lock();
        if !st.connected {
            return Err(TransportError::NotConnected);
        }
        if st.reject_requests {
            return Err(TransportError::Closed);
        }
        debug!(?req, "loopback request");
        st.requests.push(req);
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self, endpoint: &str, _identity: &str, _binary: bool) -> TransportResult<()> {
        let mut st = self.state.lock();
        if let Some(reason) = &st.connect_error {
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: reason.clone(),
            });
        }
        if st.connected {
            return Ok(());
        }
        st.connected = true;
        st.connects += 1;
        st.endpoint = endpoint.to_string();
        st.queue.push_back(RawEvent::connect(LinkState::Up, endpoint));
        self.ready.notify_all();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn poll(&self, timeout: Duration) -> Option<RawEvent> {
        let mut st = self.state.lock();
        if st.queue.is_empty() {
            self.ready.wait_while_for(&mut st, |s| s.queue.is_empty(), timeout);
        }
        st.queue.pop_front()
    }

    fn disconnect(&self) {
        let mut st = self.state.lock();
        st.connected = false;
        self.ready.notify_all();
    }

    fn open_stream(&self, service: &str, ticker: &str, request_id: u32) -> TransportResult<()> {
        self.request(StreamRequest::Open {
            service: service.to_string(),
            ticker: ticker.to_string(),
            request_id,
        })
    }

    fn close_stream(&self, service: &str, ticker: &str) -> TransportResult<()> {
        self.request(StreamRequest::Close {
            service: service.to_string(),
            ticker: ticker.to_string(),
        })
    }

    fn open_broadcast(&self, service: &str, bds: &str, request_id: u32) -> TransportResult<()> {
        self.request(StreamRequest::OpenBroadcast {
            service: service.to_string(),
            bds: bds.to_string(),
            request_id,
        })
    }

    fn close_broadcast(&self, service: &str, bds: &str) -> TransportResult<()> {
        self.request(StreamRequest::CloseBroadcast {
            service: service.to_string(),
            bds: bds.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct AdminState {
    open: bool,
    auto_ack: bool,
    queue: VecDeque<RawEvent>,
    sent: Vec<AdminCommand>,
}

#[derive(Debug, Default)]
pub struct LoopbackAdmin {
    state: Mutex<AdminState>,
    ready: Condvar,
}

impl LoopbackAdmin {
    pub fn new() -> Self {
        LoopbackAdmin::default()
    }

    /// Answer every add/delete with one ACK per ticker.
    pub fn with_auto_ack(self) -> Self {
        self.state.lock().auto_ack = true;
        self
    }

    pub fn inject(&self, event: RawEvent) {
        let mut st = self.state.lock();
        st.queue.push_back(event);
        self.ready.notify_all();
    }

    pub fn sent(&self) -> Vec<AdminCommand> {
        self.state.lock().sent.clone()
    }
}

impl AdminTransport for LoopbackAdmin {
    fn open(&self, endpoint: &str) -> TransportResult<()> {
        let mut st = self.state.lock();
        if !st.open {
            st.open = true;
            st.queue.push_back(RawEvent::connect(LinkState::Up, endpoint));
            self.ready.notify_all();
        }
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> Option<RawEvent> {
        let mut st = self.state.lock();
        if st.queue.is_empty() {
            self.ready.wait_while_for(&mut st, |s| s.queue.is_empty(), timeout);
        }
        st.queue.pop_front()
    }

    fn send(&self, command: AdminCommand) -> TransportResult<()> {
        let mut st = self.state.lock();
        if !st.open {
            return Err(TransportError::NotConnected);
        }
        if st.auto_ack {
            let replies: Vec<RawEvent> = match &command {
                AdminCommand::AddTickers { service, tickers, .. } => acks(true, service, tickers),
                AdminCommand::DelTickers { service, tickers, .. } => acks(false, service, tickers),
                _ => Vec::new(),
            };
            st.queue.extend(replies);
            self.ready.notify_all();
        }
        st.sent.push(command);
        Ok(())
    }

    fn close(&self) {
        let mut st = self.state.lock();
        st.open = false;
        self.ready.notify_all();
    }
}

fn acks(add: bool, service: &str, tickers: &[String]) -> Vec<RawEvent> {
    tickers
        .iter()
        .map(|tkr| {
            RawEvent::admin(&AdminReply {
                ack: true,
                add,
                service: service.to_string(),
                ticker: tkr.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_need_connection() {
        let lb = LoopbackTransport::new();
        assert_eq!(lb.open_stream("svc", "IBM", 1), Err(TransportError::NotConnected));
        lb.connect("localhost:9998", "test", false).unwrap();
        lb.open_stream("svc", "IBM", 1).unwrap();
        assert_eq!(lb.requests().len(), 1);
        assert_eq!(lb.connects(), 1);
        assert!(lb.poll(Duration::ZERO).is_some());
        assert!(lb.poll(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_connect_failure() {
        let lb = LoopbackTransport::new();
        lb.fail_connect("refused");
        assert!(matches!(
            lb.connect("nowhere:1", "test", false),
            Err(TransportError::ConnectFailed { .. })
        ));
        assert!(!lb.is_connected());
    }

    #[test]
    fn test_admin_auto_ack() {
        let admin = LoopbackAdmin::new().with_auto_ack();
        admin.open("localhost:8775").unwrap();
        admin
            .send(AdminCommand::AddTickers {
                service: "svc".to_string(),
                tickers: vec!["A".to_string(), "B".to_string()],
                schema: None,
            })
            .unwrap();
        // connect + two acks
        let mut n = 0;
        while admin.poll(Duration::ZERO).is_some() {
            n += 1;
        }
        assert_eq!(n, 3);
        assert_eq!(admin.sent().len(), 1);
    }
}
