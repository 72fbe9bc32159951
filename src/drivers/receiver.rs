use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{error, info};

use crate::drivers::PacketSource;

/// Polls `source` on its own thread and forwards every packet to `sender`.
///
/// The thread exits when `stop` is set, the receiving side hangs up, or the
/// source reports an error.
pub fn spawn_receiver<S>(mut source: S, sender: Sender<Vec<u8>>, stop: Arc<AtomicBool>) -> JoinHandle<()>
where
    S: PacketSource + 'static,
{
    thread::spawn(move || {
        info!("Starting receiver thread");
        while !stop.load(Ordering::Relaxed) {
            match source.next_packet() {
                Ok(Some(packet)) => {
                    if sender.send(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => thread::yield_now(),
                Err(err) => {
                    error!("Error receiving packet: {err}");
                    break;
                }
            }
        }
        info!("Receiver thread stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ManualSource;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn forwards_packets_until_stopped() {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_receiver(
            ManualSource::new(vec![vec![1], vec![2]]),
            tx,
            Arc::clone(&stop),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), vec![1]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), vec![2]);
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn exits_when_receiver_hangs_up() {
        let (tx, rx) = unbounded();
        drop(rx);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_receiver(ManualSource::new(vec![vec![1]]), tx, stop);
        handle.join().unwrap();
    }
}
