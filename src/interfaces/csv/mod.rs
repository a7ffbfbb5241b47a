pub mod permit_reader;
