/// Status code type alias. Codes are grouped into per-subsystem ranges so a
/// bare number in a log line still identifies the failing layer.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
#[allow(non_snake_case)]
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const DATA_CORRUPTION: status_code_t = 2;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const INVALID_STATE: status_code_t = 5;
    pub const IO_ERROR: status_code_t = 69;
    pub const CANCELLED: status_code_t = 90;
    pub const FOUND_BUG: status_code_t = 998;
    pub const UNKNOWN: status_code_t = 999;
}

/// Store status codes (1xxx).
#[allow(non_snake_case)]
pub mod StoreCode {
    use super::status_code_t;

    pub const OPEN_FAILED: status_code_t = 1000;
    pub const TXN_FAILED: status_code_t = 1001;
    pub const COMMIT_FAILED: status_code_t = 1002;
    pub const TABLE_ERROR: status_code_t = 1003;
    pub const GET_ERROR: status_code_t = 1004;
    pub const PUT_ERROR: status_code_t = 1005;
    pub const ITERATE_ERROR: status_code_t = 1006;
    pub const RESET_FAILED: status_code_t = 1007;
}

/// Input parsing status codes (2xxx).
#[allow(non_snake_case)]
pub mod ParseCode {
    use super::status_code_t;

    pub const BAD_LINE: status_code_t = 2000;
    pub const BAD_BASE64: status_code_t = 2001;
    pub const BAD_FIELD: status_code_t = 2002;
    pub const BAD_UTF8: status_code_t = 2003;
    pub const INPUT_IO: status_code_t = 2004;
}

/// Tree integrity status codes (3xxx).
#[allow(non_snake_case)]
pub mod TreeCode {
    use super::status_code_t;

    pub const NODE_NOT_FOUND: status_code_t = 3000;
    pub const NAME_MISMATCH: status_code_t = 3001;
    pub const PARENT_MISMATCH: status_code_t = 3002;
    pub const NOT_DIRECTORY: status_code_t = 3003;
}

/// Aggregation status codes (4xxx).
#[allow(non_snake_case)]
pub mod AggCode {
    use super::status_code_t;

    pub const ZERO_COUNT_GROUP: status_code_t = 4000;
    pub const MISSING_CHILD: status_code_t = 4001;
    pub const MAPPING_NOT_FOUND: status_code_t = 4002;
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        // Common
        StatusCode::OK => "OK",
        StatusCode::DATA_CORRUPTION => "DataCorruption",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::INVALID_STATE => "InvalidState",
        StatusCode::IO_ERROR => "IOError",
        StatusCode::CANCELLED => "Cancelled",
        StatusCode::FOUND_BUG => "FoundBug",
        StatusCode::UNKNOWN => "Unknown",

        // Store
        StoreCode::OPEN_FAILED => "Store::OpenFailed",
        StoreCode::TXN_FAILED => "Store::TxnFailed",
        StoreCode::COMMIT_FAILED => "Store::CommitFailed",
        StoreCode::TABLE_ERROR => "Store::TableError",
        StoreCode::GET_ERROR => "Store::GetError",
        StoreCode::PUT_ERROR => "Store::PutError",
        StoreCode::ITERATE_ERROR => "Store::IterateError",
        StoreCode::RESET_FAILED => "Store::ResetFailed",

        // Parse
        ParseCode::BAD_LINE => "Parse::BadLine",
        ParseCode::BAD_BASE64 => "Parse::BadBase64",
        ParseCode::BAD_FIELD => "Parse::BadField",
        ParseCode::BAD_UTF8 => "Parse::BadUtf8",
        ParseCode::INPUT_IO => "Parse::InputIO",

        // Tree
        TreeCode::NODE_NOT_FOUND => "Tree::NodeNotFound",
        TreeCode::NAME_MISMATCH => "Tree::NameMismatch",
        TreeCode::PARENT_MISMATCH => "Tree::ParentMismatch",
        TreeCode::NOT_DIRECTORY => "Tree::NotDirectory",

        // Aggregation
        AggCode::ZERO_COUNT_GROUP => "Agg::ZeroCountGroup",
        AggCode::MISSING_CHILD => "Agg::MissingChild",
        AggCode::MAPPING_NOT_FOUND => "Agg::MappingNotFound",

        _ => "Invalid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_known() {
        assert_eq!(to_string(StatusCode::OK), "OK");
        assert_eq!(to_string(StoreCode::OPEN_FAILED), "Store::OpenFailed");
        assert_eq!(to_string(ParseCode::BAD_BASE64), "Parse::BadBase64");
        assert_eq!(to_string(AggCode::ZERO_COUNT_GROUP), "Agg::ZeroCountGroup");
    }

    #[test]
    fn test_to_string_unknown() {
        assert_eq!(to_string(12345), "Invalid");
    }
}
