// encodings/mod.rs - Built-in encodings
// Both are stateless unit structs; programs hold them as `&'static dyn Encoding`.

pub mod ascii;
pub mod utf8;

pub use ascii::ENCODING_ASCII;
pub use utf8::ENCODING_UTF8;
