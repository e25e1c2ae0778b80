//! A generic UDP-peer driver. It maintains a lightweight keep-alive
//! handshake with a remote endpoint by exchanging small JSON
//! datagrams, reporting `ERROR` status if the peer's poll response
//! goes quiet for too long.
//!
//! Grounded in the original `udp_generic` driver: a `poll` key is
//! piggy-backed on outgoing datagrams at most once per polling
//! interval, and an incoming datagram missing that key for more than
//! twice the polling interval means the link is down.

use async_trait::async_trait;
use drvmgr_api::worker::{DriverChannel, Worker, WorkerCommand, WorkerEvent};
use drvmgr_api::{DriverStatus, Error, Result, VarId, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const DEFAULT_PORT: i64 = 8400;
const DEFAULT_POLLING_SECS: i64 = 1;
const DEFAULT_MAX_SIZE: i64 = 1024;

pub struct UdpDriver {
    addr: SocketAddr,
    polling: Duration,
    max_size: usize,
}

impl UdpDriver {
    fn param_str(
        parameters: &BTreeMap<String, Value>,
        key: &str,
        default: &str,
    ) -> String {
        match parameters.get(key) {
            Some(Value::Str(s)) => s.clone(),
            _ => default.to_owned(),
        }
    }

    fn param_int(
        parameters: &BTreeMap<String, Value>,
        key: &str,
        default: i64,
    ) -> i64 {
        match parameters.get(key) {
            Some(Value::Int(v)) => *v,
            _ => default,
        }
    }
}

#[async_trait]
impl Worker for UdpDriver {
    const CLASS_NAME: &'static str = "udp_driver";

    fn new(parameters: BTreeMap<String, Value>) -> Result<Self> {
        let ip = Self::param_str(&parameters, "ip", "127.0.0.1");
        let port = Self::param_int(&parameters, "port", DEFAULT_PORT);
        let polling = Self::param_int(&parameters, "polling", DEFAULT_POLLING_SECS);
        let max_size = Self::param_int(&parameters, "max_size", DEFAULT_MAX_SIZE);

        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .map_err(|_| Error::BadConfig(format!("invalid UDP address {ip}:{port}")))?;

        Ok(UdpDriver {
            addr,
            polling: Duration::from_secs(polling.max(1) as u64),
            max_size: max_size.max(1) as usize,
        })
    }

    async fn run(self, mut channel: Box<dyn DriverChannel>) {
        let mut known: BTreeMap<VarId, ()> = BTreeMap::new();
        let mut status = DriverStatus::Setup;

        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(s) => s,
            Err(e) => {
                warn!("udp_driver: couldn't bind local socket -- {e}");
                let _ = channel.send(WorkerEvent::Status(DriverStatus::Error)).await;
                return;
            }
        };

        if socket.connect(self.addr).await.is_err() {
            let _ = channel.send(WorkerEvent::Status(DriverStatus::Error)).await;
            return;
        }

        let mut last_sent_poll = Instant::now() - self.polling;
        let mut last_recv_poll = Instant::now();
        let mut ticker = tokio::time::interval(self.polling);
        let mut buf = vec![0u8; self.max_size];

        loop {
            tokio::select! {
                cmd = channel.recv() => {
                    match cmd {
                        Some(WorkerCommand::AddVariables(vars)) => {
                            for id in vars.keys() {
                                known.insert(id.clone(), ());
                            }
                        }
                        Some(WorkerCommand::Update(values)) => {
                            send_datagram(&socket, &values, &mut last_sent_poll, self.polling).await;
                        }
                        Some(WorkerCommand::Exit) | None => break,
                    }
                }

                _ = ticker.tick() => {
                    let empty = BTreeMap::new();
                    send_datagram(&socket, &empty, &mut last_sent_poll, self.polling).await;

                    if last_recv_poll.elapsed() > self.polling * 2 {
                        if status != DriverStatus::Error {
                            status = DriverStatus::Error;
                            let _ = channel.send(WorkerEvent::Status(status)).await;
                            let _ = channel
                                .send(WorkerEvent::Info("udp_driver: poll response was not received on time".into()))
                                .await;
                        }
                    }
                }

                result = socket.recv(&mut buf) => {
                    match result {
                        Ok(n) => {
                            if let Ok(obj) = serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&buf[..n]) {
                                let mut updates = BTreeMap::new();

                                for (key, json_val) in obj {
                                    if key == "poll" {
                                        last_recv_poll = Instant::now();
                                        continue;
                                    }
                                    if known.contains_key(&VarId::from(key.as_str())) {
                                        if let Some(v) = json_to_value(&json_val) {
                                            updates.insert(VarId::from(key.as_str()), v);
                                        }
                                    }
                                }

                                if status != DriverStatus::Running {
                                    status = DriverStatus::Running;
                                    let _ = channel.send(WorkerEvent::Status(status)).await;
                                }

                                if !updates.is_empty() {
                                    let _ = channel.send(WorkerEvent::Update(updates)).await;
                                }
                            } else {
                                debug!("udp_driver: received malformed datagram");
                            }
                        }
                        Err(e) => {
                            warn!("udp_driver: recv error -- {e}");
                        }
                    }
                }
            }
        }
    }
}

async fn send_datagram(
    socket: &UdpSocket,
    values: &BTreeMap<VarId, Value>,
    last_sent_poll: &mut Instant,
    polling: Duration,
) {
    let mut obj = serde_json::Map::new();

    if last_sent_poll.elapsed() >= polling {
        obj.insert("poll".into(), serde_json::json!(chrono_secs()));
        *last_sent_poll = Instant::now();
    }

    for (id, value) in values {
        if let Ok(v) = serde_json::to_value(value) {
            obj.insert(id.to_string(), v);
        }
    }

    if obj.is_empty() {
        return;
    }

    if let Ok(bytes) = serde_json::to_vec(&obj) {
        let _ = socket.send(&bytes).await;
    }
}

fn chrono_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn json_to_value(v: &serde_json::Value) -> Option<Value> {
    match v {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Flt)
            }
        }
        serde_json::Value::String(s) => Some(Value::Str(s.clone())),
        serde_json::Value::Array(items) => {
            let bools: Option<Vec<bool>> = items.iter().map(|i| i.as_bool()).collect();
            if let Some(b) = bools {
                return Some(Value::BoolArray(b));
            }
            let ints: Option<Vec<i64>> = items.iter().map(|i| i.as_i64()).collect();
            if let Some(i) = ints {
                return Some(Value::IntArray(i));
            }
            let flts: Option<Vec<f64>> = items.iter().map(|i| i.as_f64()).collect();
            flts.map(Value::FltArray)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_parameters_missing() {
        let drv = UdpDriver::new(BTreeMap::new()).unwrap();

        assert_eq!(drv.addr.port(), DEFAULT_PORT as u16);
        assert_eq!(drv.polling, Duration::from_secs(1));
    }

    #[test]
    fn parameters_override_defaults() {
        let mut parameters = BTreeMap::new();
        parameters.insert("ip".to_string(), Value::Str("127.0.0.1".into()));
        parameters.insert("port".to_string(), Value::Int(9000));
        parameters.insert("polling".to_string(), Value::Int(2));

        let drv = UdpDriver::new(parameters).unwrap();

        assert_eq!(drv.addr.port(), 9000);
        assert_eq!(drv.polling, Duration::from_secs(2));
    }

    #[test]
    fn json_scalar_conversion() {
        assert_eq!(json_to_value(&serde_json::json!(true)), Some(Value::Bool(true)));
        assert_eq!(json_to_value(&serde_json::json!(42)), Some(Value::Int(42)));
        assert_eq!(
            json_to_value(&serde_json::json!("hi")),
            Some(Value::Str("hi".into()))
        );
        assert_eq!(
            json_to_value(&serde_json::json!([1, 2, 3])),
            Some(Value::IntArray(vec![1, 2, 3]))
        );
    }
}
