//! Standard and application JSON-RPC 2.0 error codes.

use fileward_core::ErrorKind;

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// Application error codes.

/// Protocol version mismatch.
pub const VERSION_NOT_SUPPORTED: i64 = -32002;

/// The agent has not been initialized yet (must call `initialize` first).
pub const NOT_INITIALIZED: i64 = -32007;

/// The file or directory was not found.
pub const FILE_NOT_FOUND: i64 = -32010;

/// Permission denied for the requested file operation.
pub const PERMISSION_DENIED: i64 = -32011;

/// The file operation failed inside the engine.
pub const FILE_OPERATION_FAILED: i64 = -32012;

/// The destination name is already taken.
pub const FILE_ALREADY_EXISTS: i64 = -32016;

/// A directory still has entries.
pub const DIRECTORY_NOT_EMPTY: i64 = -32017;

/// A move skipped names that already existed at the destination.
pub const TRANSFER_CONFLICT: i64 = -32018;

/// The action request was malformed or referred to an invalid target.
pub const BAD_ACTION: i64 = -32019;

/// Application code for an engine error kind.
pub fn for_kind(kind: ErrorKind) -> i64 {
    match kind {
        ErrorKind::NotFound => FILE_NOT_FOUND,
        ErrorKind::PermissionDenied => PERMISSION_DENIED,
        ErrorKind::AlreadyExists => FILE_ALREADY_EXISTS,
        ErrorKind::DirectoryNotEmpty => DIRECTORY_NOT_EMPTY,
        ErrorKind::Conflict => TRANSFER_CONFLICT,
        ErrorKind::BadRequest => BAD_ACTION,
        ErrorKind::Internal => FILE_OPERATION_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_CODES: [i64; 9] = [
        VERSION_NOT_SUPPORTED,
        NOT_INITIALIZED,
        FILE_NOT_FOUND,
        PERMISSION_DENIED,
        FILE_OPERATION_FAILED,
        FILE_ALREADY_EXISTS,
        DIRECTORY_NOT_EMPTY,
        TRANSFER_CONFLICT,
        BAD_ACTION,
    ];

    #[test]
    fn standard_codes_in_json_rpc_range() {
        let standard = [
            PARSE_ERROR,
            INVALID_REQUEST,
            METHOD_NOT_FOUND,
            INVALID_PARAMS,
            INTERNAL_ERROR,
        ];
        for code in standard {
            assert!(
                (-32768..=-32000).contains(&code),
                "Standard code {code} should be in -32768..-32000"
            );
        }
    }

    #[test]
    fn application_codes_in_expected_range() {
        for code in APP_CODES {
            assert!(
                (-32099..=-32000).contains(&code),
                "Application code {code} should be in -32099..-32000"
            );
        }
    }

    #[test]
    fn application_codes_are_distinct() {
        let mut codes = APP_CODES.to_vec();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), APP_CODES.len());
    }

    #[test]
    fn every_kind_has_its_own_code() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists,
            ErrorKind::DirectoryNotEmpty,
            ErrorKind::Conflict,
            ErrorKind::BadRequest,
            ErrorKind::Internal,
        ];
        let mut codes: Vec<i64> = kinds.iter().map(|k| for_kind(*k)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
