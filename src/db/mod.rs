// This module is split into smaller files to keep each file focused.
// The pieces are `include!`'d so everything remains in `crate::db`.

include!("parts/01_prelude.rs");
include!("parts/02_migrate.rs");
include!("parts/03_rooms.rs");
include!("parts/04_files.rs");
include!("parts/05_sync.rs");
include!("parts/06_ops.rs");
include!("parts/07_changesets.rs");
