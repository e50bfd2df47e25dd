//! Per-request context handed to handlers and middleware.
//!
//! A [`Context`] owns the [`Request`] plus an [`Extensions`] map that middleware can use
//! to pass typed state down the chain.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map, keyed by type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

/// The request plus whatever state middleware attached to it.
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[derive(Debug, PartialEq)]
    struct UserId(u64);

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.extensions_mut().insert(UserId(7));
        ctx.extensions_mut().insert("tenant");

        assert_eq!(ctx.extensions().get::<UserId>(), Some(&UserId(7)));
        assert_eq!(ctx.extensions().get::<&str>(), Some(&"tenant"));
        ctx.extensions_mut().insert(UserId(9));
        assert_eq!(ctx.extensions().get::<UserId>(), Some(&UserId(9)));
        assert!(ctx.extensions().get::<u64>().is_none());
    }
}
