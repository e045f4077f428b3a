//! Broadcast channel for monitor events.

use tokio::sync::broadcast;
use txwatch_types::MonitorEvent;

/// Cloneable handle to a broadcast channel of [`MonitorEvent`]s.
///
/// Publishing never blocks. Slow subscribers lag and lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: MonitorEvent,
	) -> Result<usize, broadcast::error::SendError<MonitorEvent>> {
		self.sender.send(event)
	}
}
