// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

pub mod agent;
pub mod init;
pub mod supervisor;
