//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Test framework for ZanDraw backends.
//!
//! A backend crate implements [`backend_tests::TestDriver`] in its
//! integration tests and instantiates the whole suite with
//! `zandraw_generate_backend_tests!`.
#![warn(rust_2018_idioms)]

pub mod backend_tests;
pub mod utils;
