/// Type-state markers for the builder pattern
///
/// These types track which required parts (address and handler) have been
/// set, so `build()` only exists once both are present.

use std::marker::PhantomData;

/// Marker trait for address state
pub trait AddressState {}

/// Address has not been set
pub struct NoAddress;
impl AddressState for NoAddress {}

/// Address has been set
pub struct HasAddress;
impl AddressState for HasAddress {}

/// Marker trait for handler state
pub trait HandlerState {}

/// Handler has not been set
pub struct NoHandler;
impl HandlerState for NoHandler {}

/// Handler has been set
pub struct HasHandler;
impl HandlerState for HasHandler {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<A, H> {
    _address: PhantomData<A>,
    _handler: PhantomData<H>,
}

impl<A, H> TypeState<A, H> {
    pub(crate) fn new() -> Self {
        Self {
            _address: PhantomData,
            _handler: PhantomData,
        }
    }
}

impl<A, H> Default for TypeState<A, H> {
    fn default() -> Self {
        Self::new()
    }
}
