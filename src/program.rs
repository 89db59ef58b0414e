use std::{
    fmt,
    marker::PhantomData,
};


/// Программа, которую исполняет каждый воркер пула.
///
/// Пул ничего не знает о том, что именно считается: он передаёт `Input`
/// воркеру и ждёт ровно один `Ok(Output)` или `Err(Error)`. Каждый слот
/// получает собственный клон программы, поэтому `run` может держать
/// состояние между задачами одного воркера.
pub trait WorkerProgram: Clone + Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;
    type Error: Send + 'static;

    fn run(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// Программа из замыкания, см. [`program_fn`]
pub struct FnProgram<F, S> {
    f: F,
    _input: PhantomData<fn(S)>,
}

impl<F: Clone, S> Clone for FnProgram<F, S> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _input: PhantomData,
        }
    }
}

impl<F, S> fmt::Debug for FnProgram<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProgram").finish_non_exhaustive()
    }
}

impl<F, S, R, E> WorkerProgram for FnProgram<F, S>
where
    F: FnMut(S) -> Result<R, E> + Clone + Send + 'static,
    S: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    type Input = S;
    type Output = R;
    type Error = E;

    #[inline]
    fn run(&mut self, input: S) -> Result<R, E> {
        (self.f)(input)
    }
}

/// Оборачивает замыкание `FnMut(S) -> Result<R, E>` в [`WorkerProgram`]
///
/// ```
/// use slot_pool::program::{program_fn, WorkerProgram};
///
/// let mut double = program_fn(|x: u64| Ok::<_, String>(x * 2));
/// assert_eq!(double.run(21), Ok(42));
/// ```
pub fn program_fn<F, S, R, E>(f: F) -> FnProgram<F, S>
where
    F: FnMut(S) -> Result<R, E> + Clone + Send + 'static,
{
    FnProgram {
        f,
        _input: PhantomData,
    }
}
