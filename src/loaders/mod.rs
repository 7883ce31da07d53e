//! Background jobs running next to the services

pub mod promotions_sweeper;
