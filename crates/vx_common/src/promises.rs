//! One-shot handoff of results computed on another thread.

use crate::prelude::*;

/// The eventual outcome of a request answered on another thread.
///
/// The producing side fulfills the paired sender exactly once. Consumers either poll
/// with [`Self::try_resolve`] once per tick (the remote chunk fetch path) or block with
/// [`Self::wait`] (connection bring-up and tests). The outcome is handed out a single
/// time; afterwards the value is spent.
#[must_use]
pub struct Deferred<T: Send + 'static> {
    state: DeferredState<T>,
}

enum DeferredState<T: Send + 'static> {
    /// No answer yet.
    Waiting(AsyncOneshotReceiver<Result<T>>),
    /// Created pre-answered; the outcome has not been handed out yet.
    Immediate(Result<T>),
    /// The producer dropped its end without ever answering.
    Lost,
    /// The outcome was already handed out.
    Spent,
}

impl<T: Send + 'static> Deferred<T> {
    /// Creates an unanswered value along with the sender that fulfills it.
    pub fn pair() -> (Self, AsyncOneshotSender<Result<T>>) {
        let (tx, rx) = async_oneshot_channel();
        (
            Self {
                state: DeferredState::Waiting(rx),
            },
            tx,
        )
    }

    /// Creates an already-fulfilled value.
    pub fn ready(value: T) -> Self {
        Self {
            state: DeferredState::Immediate(Ok(value)),
        }
    }

    /// Creates an already-failed value.
    pub fn failed(error: anyhow::Error) -> Self {
        Self {
            state: DeferredState::Immediate(Err(error)),
        }
    }

    /// Hands out the outcome if it has arrived, without blocking.
    ///
    /// `None` means the producer is still working, the outcome was taken earlier, or
    /// the producer is gone; [`Self::is_lost`] identifies the last case.
    pub fn try_resolve(&mut self) -> Option<Result<T>> {
        match &mut self.state {
            DeferredState::Waiting(rx) => match rx.try_recv() {
                Ok(outcome) => {
                    self.state = DeferredState::Spent;
                    Some(outcome)
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => None,
                Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    self.state = DeferredState::Lost;
                    None
                }
            },
            DeferredState::Immediate(_) => {
                let DeferredState::Immediate(outcome) = std::mem::replace(&mut self.state, DeferredState::Spent)
                else {
                    unreachable!()
                };
                Some(outcome)
            }
            DeferredState::Lost | DeferredState::Spent => None,
        }
    }

    /// Whether the producer dropped its end without ever answering.
    pub fn is_lost(&self) -> bool {
        matches!(self.state, DeferredState::Lost)
    }

    /// Blocks the current thread until the outcome arrives. Not for async contexts.
    pub fn wait(self) -> Result<T> {
        match self.state {
            DeferredState::Waiting(rx) => rx.blocking_recv().unwrap_or_else(|e| Err(anyhow::Error::from(e))),
            DeferredState::Immediate(outcome) => outcome,
            DeferredState::Lost => bail!("The answering side disappeared without a result"),
            DeferredState::Spent => bail!("The result was already taken"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_handed_out_once() {
        let (mut deferred, tx) = Deferred::pair();
        assert!(deferred.try_resolve().is_none());
        tx.send(Ok(5i32)).unwrap();
        assert_eq!(deferred.try_resolve().unwrap().unwrap(), 5);
        // Spent afterwards.
        assert!(deferred.try_resolve().is_none());
        assert!(!deferred.is_lost());
    }

    #[test]
    fn dropped_producer_is_lost_not_an_answer() {
        let (mut deferred, tx) = Deferred::<i32>::pair();
        drop(tx);
        assert!(deferred.try_resolve().is_none());
        assert!(deferred.is_lost());
        assert!(deferred.try_resolve().is_none());
    }

    #[test]
    fn wait_returns_the_answer() {
        let (deferred, tx) = Deferred::pair();
        tx.send(Ok("done")).unwrap();
        assert_eq!(deferred.wait().unwrap(), "done");

        assert_eq!(Deferred::ready(3u8).wait().unwrap(), 3);
        assert!(Deferred::<u8>::failed(anyhow!("nope")).wait().is_err());
    }

    #[test]
    fn wait_reports_a_lost_producer() {
        let (deferred, tx) = Deferred::<i32>::pair();
        drop(tx);
        assert!(deferred.wait().is_err());
    }
}
