//! Compile-time defaults, merged by build.rs from the library defaults and
//! the optional user file named by `VCT_CONFIG_RS`.

include!(concat!(env!("OUT_DIR"), "/vct_merged_config.rs"));
