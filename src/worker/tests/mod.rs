//! Unit tests for the worker loop.
