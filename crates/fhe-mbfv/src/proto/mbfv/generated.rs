#![allow(missing_docs)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Share {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub p0: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub p1: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(uint32, tag = "3")]
    pub level: u32,
    #[prost(uint32, tag = "4")]
    pub parties: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RotationShare {
    #[prost(message, optional, tag = "1")]
    pub share: ::core::option::Option<Share>,
    #[prost(uint64, tag = "2")]
    pub galois_element: u64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommonRandomPoly {
    #[prost(bytes = "vec", tag = "1")]
    pub poly: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub level: u32,
}
