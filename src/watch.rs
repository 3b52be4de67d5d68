use crate::core::parent_dir;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// How long the document must stay untouched before we announce a change.
/// Editors tend to save in several steps.
const QUIET_PERIOD: Duration = Duration::from_millis(50);

pub struct Watch {
    _watcher: RecommendedWatcher,
    channel: broadcast::Sender<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Reload,
    /// The server is going away; listeners should hang up.
    Shutdown,
}

impl Watch {
    /// Watch a single file. We watch its directory rather than the file
    /// itself, so that we keep seeing changes when an editor replaces it.
    pub fn new(file: &Path) -> notify::Result<Self> {
        let (tx, _) = broadcast::channel(16);
        let (raw_tx, raw_rx) = unbounded();
        let name: Option<OsString> = file.file_name().map(Into::into);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_change(&event.kind) && touches(&event, name.as_deref()) => {
                    // The debouncer only stops listening when we're dropped.
                    let _ = raw_tx.send(());
                }
                Ok(_) => (),
                Err(e) => tracing::warn!("watch error: {e}"),
            },
            Config::default(),
        )?;
        watcher.watch(parent_dir(file), RecursiveMode::NonRecursive)?;

        let channel = tx.clone();
        thread::spawn(move || debounce(&raw_rx, QUIET_PERIOD, &channel));

        Ok(Self {
            _watcher: watcher,
            channel: tx,
        })
    }

    /// Subscribe to change events.
    pub fn stream(&self) -> impl Stream<Item = Event> + use<> {
        // Lagging subscribers just miss some reloads.
        BroadcastStream::new(self.channel.subscribe()).filter_map(Result::ok)
    }

    /// Tell every subscriber to stop listening.
    pub fn shutdown(&self) {
        let _ = self.channel.send(Event::Shutdown);
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

fn touches(event: &notify::Event, name: Option<&std::ffi::OsStr>) -> bool {
    event.paths.iter().any(|p| p.file_name() == name)
}

/// Coalesce bursts of raw change notifications into single reload events. A
/// burst ends once `quiet` passes without a notification.
fn debounce(rx: &Receiver<()>, quiet: Duration, tx: &broadcast::Sender<Event>) {
    while rx.recv().is_ok() {
        loop {
            match rx.recv_timeout(quiet) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = tx.send(Event::Reload);
                    return;
                }
            }
        }
        tracing::debug!("document changed");
        // It's OK to drop events when nobody is listening.
        let _ = tx.send(Event::Reload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn burst_is_one_reload() {
        let (raw_tx, raw_rx) = unbounded();
        let (tx, mut rx) = broadcast::channel(16);
        for _ in 0..3 {
            raw_tx.send(()).unwrap();
        }
        drop(raw_tx);

        debounce(&raw_rx, QUIET_PERIOD, &tx);
        assert_eq!(rx.try_recv().unwrap(), Event::Reload);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn separate_bursts() {
        let (raw_tx, raw_rx) = unbounded();
        let (tx, mut rx) = broadcast::channel(16);
        let handle = thread::spawn(move || debounce(&raw_rx, Duration::from_millis(20), &tx));

        raw_tx.send(()).unwrap();
        raw_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(200));
        raw_tx.send(()).unwrap();
        drop(raw_tx);
        handle.join().unwrap();

        assert_eq!(rx.try_recv().unwrap(), Event::Reload);
        assert_eq!(rx.try_recv().unwrap(), Event::Reload);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn nothing_without_changes() {
        let (raw_tx, raw_rx) = unbounded::<()>();
        let (tx, mut rx) = broadcast::channel(16);
        drop(raw_tx);

        debounce(&raw_rx, QUIET_PERIOD, &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn filters_by_name() {
        let event = |path: &str| {
            notify::Event::new(EventKind::Any).add_path(PathBuf::from(path))
        };
        let name = Some(std::ffi::OsStr::new("paper.md"));
        assert!(touches(&event("/docs/paper.md"), name));
        assert!(!touches(&event("/docs/other.md"), name));
        assert!(!touches(&event("/docs/paper.md.swp"), name));
    }

    #[test]
    fn change_kinds() {
        use notify::event::{AccessKind, CreateKind, ModifyKind};
        assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_change(&EventKind::Access(AccessKind::Any)));
    }
}
