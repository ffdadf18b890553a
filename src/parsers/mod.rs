pub mod sndlib_parser;
pub mod xml_models;
