//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types, with different argument
//! lists, in one `Vec<Route>`. Rust collections can only hold one concrete
//! type, so every handler is hidden behind the [`ErasedHandler`] trait object.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hi(Path(name): Path<String>) -> Json<Greeting>   ← user writes this
//!        ↓ router.get("/hi/{name}", hi)
//! hi.into_boxed_handler()                                   ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler { f: hi, .. })                         ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(cx)  at request time                         ← one vtable dispatch
//!        ↓
//! each argument: FromCall::from_call(&cx)                   ← injection
//!        ↓
//! Box::pin(async { hi(arg).await.into_reply() })            ← BoxFuture
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::inject::{CallContext, FromCall};
use crate::response::{IntoReply, Reply};

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, cx: CallContext) -> BoxFuture<Result<Reply>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any `async fn` (or
/// closure returning a future) whose arguments all implement
/// [`FromCall`] and whose output implements [`IntoReply`]:
///
/// ```text
/// async fn name(a: A, b: B, ...) -> impl IntoReply
/// ```
///
/// `Args` is the tuple of argument types; it only exists so the blanket
/// impls for different arities do not overlap.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed<Args> {}
}

/// Holds a concrete handler `F` and implements [`ErasedHandler`].
struct FnHandler<F, Args> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

macro_rules! impl_handler_for_fn ({ $($param:ident)* } => {
    impl<F, Fut, R, $($param,)*> private::Sealed<($($param,)*)> for F
    where
        F: Fn($($param),*) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + Send + 'static,
        $($param: FromCall,)*
    {
    }

    impl<F, Fut, R, $($param,)*> Handler<($($param,)*)> for F
    where
        F: Fn($($param),*) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + Send + 'static,
        $($param: FromCall,)*
    {
        fn into_boxed_handler(self) -> BoxedHandler {
            Arc::new(FnHandler { f: self, _args: PhantomData::<fn(($($param,)*))> })
        }
    }

    impl<F, Fut, R, $($param,)*> ErasedHandler for FnHandler<F, ($($param,)*)>
    where
        F: Fn($($param),*) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + Send + 'static,
        $($param: FromCall,)*
    {
        #[allow(non_snake_case, unused_variables)]
        fn call(&self, cx: CallContext) -> BoxFuture<Result<Reply>> {
            // Arguments resolve left to right; the first failure aborts the call
            // before the handler body runs.
            $(
                let $param = match <$param as FromCall>::from_call(&cx) {
                    Ok(value) => value,
                    Err(e) => return Box::pin(std::future::ready(Err(e.into()))),
                };
            )*
            let fut = (self.f)($($param),*);
            Box::pin(async move { fut.await.into_reply() })
        }
    }
});

impl_handler_for_fn! {}
impl_handler_for_fn! { A }
impl_handler_for_fn! { A B }
impl_handler_for_fn! { A B C }
impl_handler_for_fn! { A B C D }
impl_handler_for_fn! { A B C D E }
impl_handler_for_fn! { A B C D E G }
impl_handler_for_fn! { A B C D E G H }
