//! Resumable computations.
//!
//! A [`Computation`] is advanced one [`Step`] at a time. Each step either
//! finishes with the output, pauses with a value that is fed back into the
//! next step, or suspends on a future whose value is fed back once it
//! resolves. Plain callbacks, closure coroutines and single futures are all
//! expressed through the same trait so the scheduler advances them uniformly.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use anyhow::bail;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// A pending asynchronous value that resumes a suspended computation.
pub type Suspension<R> = LocalBoxFuture<'static, anyhow::Result<R>>;

/// Outcome of advancing a computation once.
pub enum Step<T, R = ()> {
    /// The computation finished.
    Done(T),
    /// Give control back to the scheduler. The value is the next step's input.
    Pending(R),
    /// Wait for an asynchronous value. It becomes the next step's input.
    Suspended(Suspension<R>),
}

impl<T> Step<T, ()> {
    /// Yield without carrying a value.
    pub fn pause() -> Self {
        Step::Pending(())
    }
}

impl<T, R: 'static> Step<T, R> {
    /// Suspend until `fut` resolves.
    pub fn wait_for<F>(fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<R>> + 'static,
    {
        Step::Suspended(fut.boxed_local())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

impl<T: fmt::Debug, R: fmt::Debug> fmt::Debug for Step<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Done(v) => f.debug_tuple("Done").field(v).finish(),
            Step::Pending(v) => f.debug_tuple("Pending").field(v).finish(),
            Step::Suspended(_) => f.write_str("Suspended(..)"),
        }
    }
}

/// A unit of work that can be advanced in discrete steps.
///
/// `input` is `None` on the first step. Afterwards it carries the value of
/// the previous [`Step::Pending`] or of the resolved [`Step::Suspended`].
pub trait Computation: 'static {
    type Output: 'static;
    type Resume: 'static;

    fn step(&mut self, input: Option<Self::Resume>) -> anyhow::Result<Step<Self::Output, Self::Resume>>;

    /// Run `self` to completion, then continue with the computation built
    /// from its output. Pauses and suspensions of both halves are forwarded,
    /// so the pair is scheduled as one task.
    fn then<F, C>(self, next: F) -> Then<Self, F, C>
    where
        Self: Sized,
        F: FnOnce(Self::Output) -> C + 'static,
        C: Computation<Resume = Self::Resume>,
    {
        Then {
            stage: Stage::First(self, Some(next)),
        }
    }
}

/// Drive a computation to completion without yielding to the scheduler.
///
/// Pauses are resumed immediately. Suspending is an error, since there is no
/// executor to wait on here.
pub fn run_to_completion<C: Computation>(mut computation: C) -> anyhow::Result<C::Output> {
    let mut input = None;
    loop {
        match computation.step(input.take())? {
            Step::Done(v) => return Ok(v),
            Step::Pending(r) => input = Some(r),
            Step::Suspended(_) => bail!("computation suspended while being run to completion"),
        }
    }
}

// ── Adapters ─────────────────────────────────────────────────

/// A plain callback, invoked exactly once.
pub struct Call<F> {
    f: Option<F>,
}

pub fn call<T, F>(f: F) -> Call<F>
where
    F: FnOnce() -> anyhow::Result<T> + 'static,
    T: 'static,
{
    Call { f: Some(f) }
}

impl<T, F> Computation for Call<F>
where
    F: FnOnce() -> anyhow::Result<T> + 'static,
    T: 'static,
{
    type Output = T;
    type Resume = ();

    fn step(&mut self, _input: Option<()>) -> anyhow::Result<Step<T>> {
        match self.f.take() {
            Some(f) => f().map(Step::Done),
            None => bail!("callback already invoked"),
        }
    }
}

/// A closure that is called once per step.
pub struct FromFn<F, T, R> {
    f: F,
    _marker: PhantomData<fn() -> (T, R)>,
}

pub fn from_fn<T, R, F>(f: F) -> FromFn<F, T, R>
where
    F: FnMut(Option<R>) -> anyhow::Result<Step<T, R>> + 'static,
    T: 'static,
    R: 'static,
{
    FromFn {
        f,
        _marker: PhantomData,
    }
}

impl<T, R, F> Computation for FromFn<F, T, R>
where
    F: FnMut(Option<R>) -> anyhow::Result<Step<T, R>> + 'static,
    T: 'static,
    R: 'static,
{
    type Output = T;
    type Resume = R;

    fn step(&mut self, input: Option<R>) -> anyhow::Result<Step<T, R>> {
        (self.f)(input)
    }
}

/// A single future: suspends on the first step and finishes with its value.
pub struct FromFuture<Fut> {
    fut: Option<Fut>,
}

pub fn from_future<T, Fut>(fut: Fut) -> FromFuture<Fut>
where
    Fut: Future<Output = anyhow::Result<T>> + 'static,
    T: 'static,
{
    FromFuture { fut: Some(fut) }
}

impl<T, Fut> Computation for FromFuture<Fut>
where
    Fut: Future<Output = anyhow::Result<T>> + 'static,
    T: 'static,
{
    type Output = T;
    type Resume = T;

    fn step(&mut self, input: Option<T>) -> anyhow::Result<Step<T, T>> {
        if let Some(value) = input {
            return Ok(Step::Done(value));
        }
        match self.fut.take() {
            Some(fut) => Ok(Step::wait_for(fut)),
            None => bail!("future resumed without a value"),
        }
    }
}

enum Stage<A, F, C> {
    First(A, Option<F>),
    Second(C),
}

/// See [`Computation::then`].
pub struct Then<A, F, C> {
    stage: Stage<A, F, C>,
}

impl<A, F, C> Computation for Then<A, F, C>
where
    A: Computation,
    F: FnOnce(A::Output) -> C + 'static,
    C: Computation<Resume = A::Resume>,
{
    type Output = C::Output;
    type Resume = A::Resume;

    fn step(&mut self, input: Option<A::Resume>) -> anyhow::Result<Step<C::Output, A::Resume>> {
        let next = match &mut self.stage {
            Stage::Second(second) => return second.step(input),
            Stage::First(first, next) => match first.step(input)? {
                Step::Done(v) => match next.take() {
                    Some(build) => build(v),
                    None => bail!("continuation already consumed"),
                },
                Step::Pending(r) => return Ok(Step::Pending(r)),
                Step::Suspended(s) => return Ok(Step::Suspended(s)),
            },
        };
        let mut second = next;
        let out = second.step(None);
        self.stage = Stage::Second(second);
        out
    }
}
