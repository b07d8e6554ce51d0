pub mod sd_log;
