pub mod bignum;
pub mod coding;
pub mod murmur3;
pub mod varint;

pub use bignum::BigNum;
