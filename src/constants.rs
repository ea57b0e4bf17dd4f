// Constants module - centralized default values for configuration
//
// This module defines the default values used throughout the codebase.

// =============================================================================
// Stack defaults
// =============================================================================

/// Encode quality used when neither the stack nor the defaults set one
pub const DEFAULT_QUALITY: u8 = 100;

/// Stacks are not animated unless they ask for it
pub const DEFAULT_ANIMATED: bool = false;

// =============================================================================
// Post-processor defaults
// =============================================================================

/// Default timeout for external optimizer processes in seconds
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 30;

/// Default jpegoptim executable
pub const DEFAULT_JPEGOPTIM_BINARY: &str = "/usr/bin/jpegoptim";

/// Default optipng executable
pub const DEFAULT_OPTIPNG_BINARY: &str = "/usr/bin/optipng";

/// Default optipng optimization level
pub const DEFAULT_OPTIPNG_LEVEL: u32 = 7;

/// Default oxipng preset
pub const DEFAULT_OXIPNG_LEVEL: u8 = 2;

// =============================================================================
// Loader defaults
// =============================================================================

/// Default HTTP loader timeout in seconds
pub const DEFAULT_HTTP_LOADER_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Store defaults
// =============================================================================

/// Default maximum number of derivatives kept by the memory store
pub const DEFAULT_MEMORY_STORE_MAX_ENTRIES: u64 = 10_000;

/// Default capacity of the in-process warmup queue
pub const DEFAULT_WARMUP_QUEUE_CAPACITY: usize = 256;

/// Default number of finished warmup jobs kept for status lookups
pub const DEFAULT_WARMUP_HISTORY_LIMIT: usize = 1_000;
