//! Unit tests for bytecode_system
