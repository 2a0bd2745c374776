//! Decorator composition.
//!
//! Decorators are ordinary [`tower_layer::Layer`]s. Unlike `tower::ServiceBuilder`, which treats
//! the first layer as outermost, both [`wrap`] and [`Chain`] apply decorators innermost-first:
//! the first one listed sits directly around the handler.
use super::action::Action;
use std::sync::Arc;
use tower_layer::Layer;

/// An ordered set of decorators, applied innermost-first.
pub trait Decorators<S> {
    type Service;

    fn apply(self, handler: S) -> Self::Service;
}

impl<S> Decorators<S> for () {
    type Service = S;

    fn apply(self, handler: S) -> S {
        handler
    }
}

macro_rules! impl_decorators {
    ($head:ident $head_val:ident $(, $tail:ident $tail_val:ident)*) => {
        impl<S, $head, $($tail),*> Decorators<S> for ($head, $($tail,)*)
        where
            $head: Layer<S>,
            ($($tail,)*): Decorators<<$head as Layer<S>>::Service>,
        {
            type Service = <($($tail,)*) as Decorators<<$head as Layer<S>>::Service>>::Service;

            fn apply(self, handler: S) -> Self::Service {
                let ($head_val, $($tail_val,)*) = self;
                ($($tail_val,)*).apply($head_val.layer(handler))
            }
        }
    };
}

impl_decorators!(A a);
impl_decorators!(A a, B b);
impl_decorators!(A a, B b, C c);
impl_decorators!(A a, B b, C c, D d);
impl_decorators!(A a, B b, C c, D d, E e);
impl_decorators!(A a, B b, C c, D d, E e, F f);

/// Wrap `handler` in `decorators`, the first listed being innermost.
pub fn wrap<S, D>(handler: S, decorators: D) -> D::Service
where
    D: Decorators<S>,
{
    decorators.apply(handler)
}

/// Incremental form of [`wrap`]: each `.with(..)` adds a layer outside the previous ones.
#[derive(Debug, Clone)]
pub struct Chain<S> {
    service: S,
}

impl<S> Chain<S> {
    pub fn new(handler: S) -> Self {
        Self { service: handler }
    }

    pub fn with<L>(self, layer: L) -> Chain<L::Service>
    where
        L: Layer<S>,
    {
        Chain { service: layer.layer(self.service) }
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    /// Finish the chain as a named [`Action`].
    pub fn into_action(self, name: impl Into<Arc<str>>) -> Action<S> {
        Action::new(name, self.service)
    }
}
