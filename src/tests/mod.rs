// Test modules for the netplay host
// Shared test doubles live in `fakes`


mod events_tests;
mod portmap_tests;
