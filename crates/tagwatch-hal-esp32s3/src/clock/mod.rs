pub mod ds3231;
