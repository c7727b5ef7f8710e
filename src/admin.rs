/// Admin channel
///
/// A separate control connection for adding, deleting and refreshing the
/// tickers a publisher tracks. Commands are fire-and-forget; confirmations
/// arrive on the channel's own dispatch thread as ACK/NAK callbacks keyed
/// only by `(add, service, ticker)`.

use crate::callbacks::AdminCallbacks;
use crate::config::AdminConfig;
use crate::decoder::{Decoder, Event};
use crate::error::{ChannelError, ChannelResult};
use crate::signal::ReadySignal;
use crate::transport::{AdminCommand, AdminTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct AdminChannel {
    transport: Arc<dyn AdminTransport>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<AdminCallbacks>>,
}

impl AdminChannel {
    pub fn open(
        transport: Arc<dyn AdminTransport>,
        endpoint: &str,
        callbacks: AdminCallbacks,
    ) -> ChannelResult<Self> {
        Self::open_with_config(transport, endpoint, callbacks, AdminConfig::default())
    }

    /// Connect and spawn the dispatch thread; returns once it is polling.
    pub fn open_with_config(
        transport: Arc<dyn AdminTransport>,
        endpoint: &str,
        callbacks: AdminCallbacks,
        config: AdminConfig,
    ) -> ChannelResult<Self> {
        transport.open(endpoint)?;

        let running = Arc::new(AtomicBool::new(true));
        let ready = Arc::new(ReadySignal::new());
        let worker = AdminWorker {
            transport: Arc::clone(&transport),
            running: Arc::clone(&running),
            ready: Arc::clone(&ready),
            callbacks,
            poll_interval: config.poll_interval,
        };
        let handle = match thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())
        {
            Ok(h) => h,
            Err(e) => {
                transport.close();
                return Err(ChannelError::Spawn(e.to_string()));
            }
        };
        ready.wait();
        info!(endpoint, "admin channel open");

        Ok(AdminChannel {
            transport,
            running,
            worker: Some(handle),
        })
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn send(&self, command: AdminCommand) -> ChannelResult<()> {
        if self.worker.is_none() {
            return Err(ChannelError::NotStarted);
        }
        debug!(?command, "admin send");
        Ok(self.transport.send(command)?)
    }

    pub fn add_ticker(&self, service: &str, ticker: &str, schema: Option<&str>) -> ChannelResult<()> {
        self.add_tickers(service, &[ticker], schema)
    }

    pub fn add_tickers(&self, service: &str, tickers: &[&str], schema: Option<&str>) -> ChannelResult<()> {
        self.send(AdminCommand::AddTickers {
            service: service.to_string(),
            tickers: owned(tickers),
            schema: schema.map(str::to_string),
        })
    }

    pub fn del_ticker(&self, service: &str, ticker: &str, schema: Option<&str>) -> ChannelResult<()> {
        self.del_tickers(service, &[ticker], schema)
    }

    pub fn del_tickers(&self, service: &str, tickers: &[&str], schema: Option<&str>) -> ChannelResult<()> {
        self.send(AdminCommand::DelTickers {
            service: service.to_string(),
            tickers: owned(tickers),
            schema: schema.map(str::to_string),
        })
    }

    pub fn refresh_ticker(&self, service: &str, ticker: &str, schema: Option<&str>) -> ChannelResult<()> {
        self.refresh_tickers(service, &[ticker], schema)
    }

    pub fn refresh_tickers(&self, service: &str, tickers: &[&str], schema: Option<&str>) -> ChannelResult<()> {
        self.send(AdminCommand::RefreshTickers {
            service: service.to_string(),
            tickers: owned(tickers),
            schema: schema.map(str::to_string),
        })
    }

    pub fn add_broadcast_stream(&self, service: &str, bds: &str) -> ChannelResult<()> {
        self.send(AdminCommand::AddBroadcastStream {
            service: service.to_string(),
            bds: bds.to_string(),
        })
    }

    pub fn refresh_all(&self) -> ChannelResult<()> {
        self.send(AdminCommand::RefreshAll)
    }

    /// Stop, join and release. Later calls are no-ops.
    pub fn close(&mut self) -> ChannelResult<AdminCallbacks> {
        let Some(handle) = self.worker.take() else {
            return Ok(AdminCallbacks::default());
        };
        self.running.store(false, Ordering::Release);
        let joined = handle.join();
        self.transport.close();
        info!("admin channel closed");
        joined.map_err(|_| ChannelError::DispatchPanicked)
    }
}

impl Drop for AdminChannel {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!("admin channel dropped without close(); dispatch thread detached");
            self.running.store(false, Ordering::Release);
        }
    }
}

fn owned(tickers: &[&str]) -> Vec<String> {
    tickers.iter().map(|t| t.to_string()).collect()
}

struct AdminWorker {
    transport: Arc<dyn AdminTransport>,
    running: Arc<AtomicBool>,
    ready: Arc<ReadySignal>,
    callbacks: AdminCallbacks,
    poll_interval: Duration,
}

impl AdminWorker {
    fn run(mut self) -> AdminCallbacks {
        self.ready.set();
        while self.running.load(Ordering::Acquire) {
            let Some(raw) = self.transport.poll(self.poll_interval) else {
                continue;
            };
            let code = raw.kind;
            match Decoder::decode(raw) {
                Ok(Event::Admin(reply)) => {
                    debug!(%reply, "admin reply");
                    let cb = if reply.ack {
                        self.callbacks.ack.as_mut()
                    } else {
                        self.callbacks.nak.as_mut()
                    };
                    if let Some(cb) = cb {
                        cb(reply.add, &reply.service, &reply.ticker);
                    }
                }
                Ok(Event::Connect { state, text }) => {
                    info!(%state, text = %text, "admin connection");
                    if let Some(cb) = self.callbacks.connect.as_mut() {
                        cb(&text, state);
                    }
                }
                Ok(other) => debug!(kind = ?other.kind(), "ignored on admin channel"),
                Err(e) => warn!(kind = code, error = %e, "dropping undecodable admin event"),
            }
        }
        self.callbacks
    }
}
