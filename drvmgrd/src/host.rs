//! The host ↔ manager transport (spec §1 "Out of scope": the host
//! transport is external, modeled as an abstract bidirectional
//! channel). `HostChannel` is the manager's endpoint; a concrete
//! transport (a TCP framing, a Unix socket, stdio) plugs in behind it.

use async_trait::async_trait;
use drvmgr_api::message::{HostCommand, HostEvent, HostReply};

/// The manager's view of the host transport. Reads are non-blocking:
/// `try_recv` returns `Ok(None)` rather than waiting, matching the
/// dispatcher's non-blocking drain contract (spec §4.1, §5).
#[async_trait]
pub trait HostChannel: Send {
    fn try_recv(&mut self) -> drvmgr_api::Result<Option<HostCommand>>;

    fn reply(&mut self, reply: HostReply) -> drvmgr_api::Result<()>;

    fn emit(&mut self, event: HostEvent) -> drvmgr_api::Result<()>;
}

/// An in-process host channel backed by `tokio::sync::mpsc`, useful
/// for embedding the manager and for tests that drive it end to end
/// without a real transport.
pub mod inprocess {
    use super::*;
    use tokio::sync::mpsc;

    /// Frame emitted toward the host: either a reply to a command or
    /// an asynchronous event.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Outbound {
        Reply(HostReply),
        Event(HostEvent),
    }

    pub struct InProcessHostChannel {
        rx_cmd: mpsc::UnboundedReceiver<HostCommand>,
        tx_out: mpsc::UnboundedSender<Outbound>,
    }

    /// The caller-facing handle: send commands in, receive outbound
    /// frames out.
    pub struct InProcessHostHandle {
        pub tx_cmd: mpsc::UnboundedSender<HostCommand>,
        pub rx_out: mpsc::UnboundedReceiver<Outbound>,
    }

    pub fn channel() -> (InProcessHostChannel, InProcessHostHandle) {
        let (tx_cmd, rx_cmd) = mpsc::unbounded_channel();
        let (tx_out, rx_out) = mpsc::unbounded_channel();

        (
            InProcessHostChannel { rx_cmd, tx_out },
            InProcessHostHandle { tx_cmd, rx_out },
        )
    }

    #[async_trait]
    impl HostChannel for InProcessHostChannel {
        fn try_recv(&mut self) -> drvmgr_api::Result<Option<HostCommand>> {
            match self.rx_cmd.try_recv() {
                Ok(cmd) => Ok(Some(cmd)),
                Err(mpsc::error::TryRecvError::Empty) => Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => Ok(None),
            }
        }

        fn reply(&mut self, reply: HostReply) -> drvmgr_api::Result<()> {
            let _ = self.tx_out.send(Outbound::Reply(reply));
            Ok(())
        }

        fn emit(&mut self, event: HostEvent) -> drvmgr_api::Result<()> {
            let _ = self.tx_out.send(Outbound::Event(event));
            Ok(())
        }
    }
}
