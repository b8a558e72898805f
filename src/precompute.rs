//! Memoized, cancelable cooperative tasks
//!
//! A `PreComputeTask` wraps a job factory and remembers the last job it
//! started. Asking again with equal arguments hands back the same shared
//! handle, so a search started speculatively when a ball is loaded is reused
//! when the spring is released. Each result is consumed at most once.
//!
//! Jobs are not futures: they are stepped one slice at a time from the paint
//! loop and report `Pending` until done.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Why a task produced no output
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// Superseded by a newer request or explicitly canceled
    #[error("task canceled")]
    Canceled,
    /// The job ran to completion without a result
    #[error("task failed")]
    Failed,
    /// The cache deadline passed before the job finished
    #[error("task timed out")]
    TimedOut,
    /// The result was already handed out
    #[error("task result already consumed")]
    Consumed,
}

/// Progress of a job or task
#[derive(Debug, PartialEq)]
pub enum TaskPoll<T> {
    Pending,
    Ready(Result<T, TaskError>),
}

impl<T> TaskPoll<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskPoll::Pending)
    }
}

/// A unit of work advanced in bounded slices
pub trait CooperativeJob {
    type Output;
    /// Borrowed context the job runs against
    type Env: ?Sized;

    /// Run one slice. `is_canceled` is the yield-point check.
    fn step(&mut self, env: &Self::Env, is_canceled: &dyn Fn() -> bool) -> TaskPoll<Self::Output>;
}

enum TaskState<J: CooperativeJob> {
    Running(J),
    Settled(Result<J::Output, TaskError>),
    Taken,
}

struct TaskInner<J: CooperativeJob> {
    state: TaskState<J>,
    canceled: Rc<Cell<bool>>,
}

/// Shared handle to a running or finished job
pub struct TaskHandle<J: CooperativeJob> {
    inner: Rc<RefCell<TaskInner<J>>>,
}

impl<J: CooperativeJob> Clone for TaskHandle<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<J: CooperativeJob> fmt::Debug for TaskHandle<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let state = match inner.state {
            TaskState::Running(_) => "running",
            TaskState::Settled(_) => "settled",
            TaskState::Taken => "taken",
        };
        f.debug_struct("TaskHandle")
            .field("state", &state)
            .field("canceled", &inner.canceled.get())
            .finish()
    }
}

impl<J: CooperativeJob> TaskHandle<J> {
    pub fn new(job: J) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TaskInner {
                state: TaskState::Running(job),
                canceled: Rc::new(Cell::new(false)),
            })),
        }
    }

    /// Both handles refer to the same task
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.inner.borrow().state, TaskState::Running(_))
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.borrow().canceled.get()
    }

    /// Stop the job and reject any unconsumed result
    pub fn cancel(&self) {
        self.reject(TaskError::Canceled);
    }

    fn reject(&self, error: TaskError) {
        let mut inner = self.inner.borrow_mut();
        inner.canceled.set(true);
        if !matches!(inner.state, TaskState::Taken) {
            inner.state = TaskState::Settled(Err(error));
        }
    }

    /// Run one slice of the job if it is still running; keeps the result
    pub fn advance(&self, env: &J::Env) {
        let mut inner = self.inner.borrow_mut();
        let canceled = Rc::clone(&inner.canceled);
        if let TaskState::Running(job) = &mut inner.state
            && let TaskPoll::Ready(result) = job.step(env, &|| canceled.get())
        {
            inner.state = TaskState::Settled(result);
        }
    }

    /// Advance the job and take its result once it is ready
    pub fn poll(&self, env: &J::Env) -> TaskPoll<J::Output> {
        self.advance(env);
        let mut inner = self.inner.borrow_mut();
        match std::mem::replace(&mut inner.state, TaskState::Taken) {
            TaskState::Running(job) => {
                inner.state = TaskState::Running(job);
                TaskPoll::Pending
            }
            TaskState::Settled(result) => TaskPoll::Ready(result),
            TaskState::Taken => TaskPoll::Ready(Err(TaskError::Consumed)),
        }
    }
}

/// Memo entry of a `PreComputeTask`
pub struct PreComputeCache<A, J: CooperativeJob> {
    pub args: A,
    pub handle: TaskHandle<J>,
    /// Handed out by `get_result`; must not be reused
    pub used: bool,
    pub deadline_ms: Option<f64>,
}

type JobFactory<A, J> = Box<dyn FnMut(&A) -> J>;

/// One-slot memo around a job factory
pub struct PreComputeTask<A, J: CooperativeJob> {
    factory: JobFactory<A, J>,
    timeout_ms: Option<f64>,
    cache: Option<PreComputeCache<A, J>>,
}

impl<A: PartialEq + Clone, J: CooperativeJob> PreComputeTask<A, J> {
    pub fn new(factory: impl FnMut(&A) -> J + 'static, timeout_ms: Option<f64>) -> Self {
        Self {
            factory: Box::new(factory),
            timeout_ms,
            cache: None,
        }
    }

    pub fn cache(&self) -> Option<&PreComputeCache<A, J>> {
        self.cache.as_ref()
    }

    /// Start (or reuse) a job for `args` without consuming it
    pub fn pre_compute(&mut self, args: &A, now_ms: f64) -> TaskHandle<J> {
        if let Some(cache) = &self.cache
            && !cache.used
            && !cache.handle.is_canceled()
            && cache.args == *args
        {
            log::debug!("precompute cache hit");
            return cache.handle.clone();
        }
        self.start(args, now_ms)
    }

    /// Handle for `args`, marking the cached entry as consumed
    pub fn get_result(&mut self, args: &A, now_ms: f64) -> TaskHandle<J> {
        let handle = self.pre_compute(args, now_ms);
        if let Some(cache) = &mut self.cache {
            cache.used = true;
        }
        handle
    }

    /// Step the speculative job and enforce the deadline
    ///
    /// Only unconsumed jobs are driven here; a consumed handle is polled by
    /// whoever took it.
    ///
    /// A job that times out is evicted, so the next request starts fresh.
    pub fn drive(&mut self, env: &J::Env, now_ms: f64) {
        let Some(cache) = &self.cache else {
            return;
        };
        if cache.used {
            return;
        }
        if let Some(deadline) = cache.deadline_ms
            && now_ms >= deadline
            && cache.handle.is_running()
        {
            log::warn!("precompute task timed out before being consumed");
            if let Some(expired) = self.cache.take() {
                expired.handle.reject(TaskError::TimedOut);
            }
            return;
        }
        cache.handle.advance(env);
    }

    /// Cancel the cached job, if any
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.take() {
            cache.handle.cancel();
        }
    }

    fn start(&mut self, args: &A, now_ms: f64) -> TaskHandle<J> {
        // A consumed handle belongs to its awaiter and is left alone
        if let Some(old) = self.cache.take()
            && !old.used
        {
            old.handle.cancel();
        }
        let handle = TaskHandle::new((self.factory)(args));
        self.cache = Some(PreComputeCache {
            args: args.clone(),
            handle: handle.clone(),
            used: false,
            deadline_ms: self.timeout_ms.map(|t| now_ms + t),
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down one unit per slice
    struct Countdown {
        left: u32,
        value: u32,
    }

    impl CooperativeJob for Countdown {
        type Output = u32;
        type Env = ();

        fn step(&mut self, _env: &(), is_canceled: &dyn Fn() -> bool) -> TaskPoll<u32> {
            if is_canceled() {
                return TaskPoll::Ready(Err(TaskError::Canceled));
            }
            if self.left == 0 {
                return TaskPoll::Ready(Ok(self.value));
            }
            self.left -= 1;
            TaskPoll::Pending
        }
    }

    fn counting_task(timeout_ms: Option<f64>) -> (PreComputeTask<u32, Countdown>, Rc<Cell<u32>>) {
        let created = Rc::new(Cell::new(0));
        let counter = Rc::clone(&created);
        let task = PreComputeTask::new(
            move |value: &u32| {
                counter.set(counter.get() + 1);
                Countdown { left: 2, value: *value }
            },
            timeout_ms,
        );
        (task, created)
    }

    #[test]
    fn test_equal_args_share_handle() {
        let (mut task, created) = counting_task(None);
        let a = task.pre_compute(&7, 0.0);
        let b = task.pre_compute(&7, 0.0);
        assert!(a.ptr_eq(&b));
        assert_eq!(created.get(), 1);
    }

    #[test]
    fn test_different_args_cancel_previous() {
        let (mut task, created) = counting_task(None);
        let a = task.pre_compute(&1, 0.0);
        let b = task.pre_compute(&2, 0.0);
        assert!(!a.ptr_eq(&b));
        assert_eq!(created.get(), 2);
        assert_eq!(a.poll(&()), TaskPoll::Ready(Err(TaskError::Canceled)));
        assert!(b.poll(&()).is_pending());
    }

    #[test]
    fn test_result_consumed_once() {
        let (mut task, created) = counting_task(None);
        let speculative = task.pre_compute(&5, 0.0);
        let handle = task.get_result(&5, 0.0);
        assert!(speculative.ptr_eq(&handle));

        let mut result = handle.poll(&());
        while result.is_pending() {
            result = handle.poll(&());
        }
        assert_eq!(result, TaskPoll::Ready(Ok(5)));
        assert_eq!(handle.poll(&()), TaskPoll::Ready(Err(TaskError::Consumed)));

        // Used entries are never reused
        let again = task.get_result(&5, 0.0);
        assert!(!again.ptr_eq(&handle));
        assert_eq!(created.get(), 2);
    }

    #[test]
    fn test_drive_progresses_speculative_job() {
        let (mut task, _) = counting_task(None);
        let handle = task.pre_compute(&3, 0.0);
        for _ in 0..3 {
            task.drive(&(), 0.0);
        }
        assert!(!handle.is_running());
        assert_eq!(handle.poll(&()), TaskPoll::Ready(Ok(3)));
    }

    #[test]
    fn test_deadline_rejects_unconsumed_job() {
        let (mut task, _) = counting_task(Some(100.0));
        let handle = task.pre_compute(&9, 0.0);
        task.drive(&(), 50.0);
        assert!(handle.is_running());
        task.drive(&(), 150.0);
        assert_eq!(handle.poll(&()), TaskPoll::Ready(Err(TaskError::TimedOut)));
    }

    #[test]
    fn test_timed_out_job_is_replaced() {
        let (mut task, created) = counting_task(Some(100.0));
        let expired = task.pre_compute(&9, 0.0);
        task.drive(&(), 50.0);
        task.drive(&(), 150.0);
        assert!(task.cache().is_none());

        let fresh = task.get_result(&9, 200.0);
        assert!(!fresh.ptr_eq(&expired));
        assert_eq!(created.get(), 2);
        let mut result = fresh.poll(&());
        while result.is_pending() {
            result = fresh.poll(&());
        }
        assert_eq!(result, TaskPoll::Ready(Ok(9)));
        assert_eq!(expired.poll(&()), TaskPoll::Ready(Err(TaskError::TimedOut)));
    }

    #[test]
    fn test_canceled_entry_not_reused() {
        let (mut task, created) = counting_task(None);
        let first = task.pre_compute(&4, 0.0);
        first.cancel();
        let second = task.pre_compute(&4, 0.0);
        assert!(!second.ptr_eq(&first));
        assert_eq!(created.get(), 2);
    }

    #[test]
    fn test_consumed_job_survives_new_args() {
        let (mut task, _) = counting_task(Some(100.0));
        let awaited = task.get_result(&1, 0.0);
        task.drive(&(), 500.0);
        let _speculative = task.pre_compute(&2, 500.0);
        assert!(!awaited.is_canceled());
        assert!(awaited.poll(&()).is_pending());
    }
}
