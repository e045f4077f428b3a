//! Lifecycle transition rules.

use txwatch_types::TxStatus;

/// What to do with an observed status given the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Apply,
	/// Not a forward move; leave the record untouched.
	Ignore,
	/// Leaving a terminal state.
	Reject,
}

pub fn decide(from: TxStatus, to: TxStatus) -> Decision {
	if from == to {
		return Decision::Ignore;
	}
	if from.is_terminal() {
		return Decision::Reject;
	}
	match (from, to) {
		// A nonce gap closed.
		(TxStatus::Queued, TxStatus::Pending) => Decision::Apply,
		_ if to.rank() > from.rank() => Decision::Apply,
		_ => Decision::Ignore,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use TxStatus::*;

	#[test]
	fn test_forward_moves() {
		for (from, to) in [
			(Received, Pending),
			(Received, Queued),
			(Received, Mined),
			(Received, Dropped),
			(Pending, Mined),
			(Pending, Dropped),
			(Queued, Pending),
			(Queued, Mined),
			(Queued, Dropped),
		] {
			assert_eq!(decide(from, to), Decision::Apply, "{} -> {}", from, to);
		}
	}

	#[test]
	fn test_non_forward_moves_are_ignored() {
		for (from, to) in [
			(Pending, Pending),
			(Pending, Queued),
			(Pending, Received),
			(Queued, Received),
			(Mined, Mined),
			(Dropped, Dropped),
		] {
			assert_eq!(decide(from, to), Decision::Ignore, "{} -> {}", from, to);
		}
	}

	#[test]
	fn test_terminal_exits_are_rejected() {
		for (from, to) in [
			(Mined, Pending),
			(Mined, Dropped),
			(Mined, Received),
			(Dropped, Mined),
			(Dropped, Queued),
		] {
			assert_eq!(decide(from, to), Decision::Reject, "{} -> {}", from, to);
		}
	}
}
