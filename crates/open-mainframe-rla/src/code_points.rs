//! DDM code point constants for System/38 record-level access.
//!
//! The remote strategy speaks the DDM "S38" command set understood by the
//! IBM i DDM server job. Commands, their parameters, and the reply objects
//! each have a fixed two-byte code point.

// ── DSS types ────────────────────────────────────────────
/// DSS magic byte at offset 2 of every header.
pub const DSS_MAGIC: u8 = 0xD0;

/// DSS type: Request.
pub const DSS_TYPE_REQUEST: u8 = 0x01;
/// DSS type: Reply.
pub const DSS_TYPE_REPLY: u8 = 0x02;
/// DSS type: Object (record buffers).
pub const DSS_TYPE_OBJECT: u8 = 0x03;

/// DSS format bit: chained (more DSS segments follow in this exchange).
pub const DSS_CHAIN_BIT: u8 = 0x40;
/// DSS format bit: continuation of the previous DSS.
pub const DSS_CONTINUE_BIT: u8 = 0x20;
/// DSS format bit: next chained DSS has the same correlation ID.
/// Only meaningful when DSS_CHAIN_BIT is also set.
pub const DSS_SAME_CORRELATOR_BIT: u8 = 0x10;

// ── File commands ────────────────────────────────────────
/// Commit.
pub const S38CMIT: u16 = 0xD003;
/// Close file.
pub const S38CLOSE: u16 = 0xD004;
/// Execute command string.
pub const S38CMD: u16 = 0xD005;
/// Delete current record.
pub const S38DEL: u16 = 0xD006;
/// Get record (sequential positioning).
pub const S38GET: u16 = 0xD007;
/// Get record by relative record number.
pub const S38GETD: u16 = 0xD008;
/// Get record by key.
pub const S38GETK: u16 = 0xD009;
/// Force end of data.
pub const S38FEOD: u16 = 0xD00B;
/// Put multiple records.
pub const S38PUTM: u16 = 0xD00C;
/// Open file.
pub const S38OPEN: u16 = 0xD011;
/// Rollback.
pub const S38ROLB: u16 = 0xD012;
/// Update current record.
pub const S38UPDAT: u16 = 0xD019;

// ── Command parameters ───────────────────────────────────
/// Declared name of an open file.
pub const DCLNAM: u16 = 0x1136;
/// Command string.
pub const S38CMDST: u16 = 0xD103;
/// Control list.
pub const S38CTLL: u16 = 0xD105;
/// Option list.
pub const S38OPTL: u16 = 0xD119;
/// User file control block.
pub const S38UFCB: u16 = 0xD11F;
/// Record buffer.
pub const S38BUF: u16 = 0xD405;

// ── Reply objects ────────────────────────────────────────
/// Host message reply.
pub const S38MSGRM: u16 = 0xD201;
/// I/O feedback area.
pub const S38IOFB: u16 = 0xD402;
/// Open feedback area.
pub const S38OPNFB: u16 = 0xD404;
/// End unit of work (commit/rollback completed).
pub const ENDUOWRM: u16 = 0x220C;
/// Parameter not supported by the agent.
pub const AGNPRMRM: u16 = 0x1232;
/// Conversational protocol error.
pub const PRCCNVRM: u16 = 0x1245;
/// Data stream syntax error.
pub const SYNTAXRM: u16 = 0x124C;
/// Command not supported.
pub const CMDNSPRM: u16 = 0x1250;
/// Command check.
pub const CMDCHKRM: u16 = 0x1254;

// ── Message reply parameters ─────────────────────────────
/// Severity code of a reply message.
pub const SVRCOD: u16 = 0x1149;
/// Host message identifier (7 EBCDIC characters).
pub const S38MSGID: u16 = 0xD112;
/// Host message type (2 EBCDIC digits).
pub const S38MTYPE: u16 = 0xD113;
/// Host message severity (binary).
pub const S38MSEV: u16 = 0xD114;
/// Host message text.
pub const S38MTEXT: u16 = 0xD116;

// ── Severity codes ───────────────────────────────────────
/// Informational.
pub const SVRCOD_INFO: u16 = 0;
/// Warning.
pub const SVRCOD_WARNING: u16 = 4;
/// Error: the command failed.
pub const SVRCOD_ERROR: u16 = 8;
/// Severe error.
pub const SVRCOD_SEVERE: u16 = 16;
/// Access damage.
pub const SVRCOD_ACCDMG: u16 = 20;
/// Permanent damage.
pub const SVRCOD_PRMDMG: u16 = 24;
/// Session damage: the conversation is over.
pub const SVRCOD_SESDMG: u16 = 28;

/// Display name for a code point, for logging.
pub fn name(code_point: u16) -> &'static str {
    match code_point {
        S38CMIT => "S38CMIT",
        S38CLOSE => "S38CLOSE",
        S38CMD => "S38CMD",
        S38DEL => "S38DEL",
        S38GET => "S38GET",
        S38GETD => "S38GETD",
        S38GETK => "S38GETK",
        S38FEOD => "S38FEOD",
        S38PUTM => "S38PUTM",
        S38OPEN => "S38OPEN",
        S38ROLB => "S38ROLB",
        S38UPDAT => "S38UPDAT",
        S38BUF => "S38BUF",
        S38MSGRM => "S38MSGRM",
        S38IOFB => "S38IOFB",
        S38OPNFB => "S38OPNFB",
        ENDUOWRM => "ENDUOWRM",
        AGNPRMRM => "AGNPRMRM",
        PRCCNVRM => "PRCCNVRM",
        SYNTAXRM => "SYNTAXRM",
        CMDNSPRM => "CMDNSPRM",
        CMDCHKRM => "CMDCHKRM",
        _ => "UNKNOWN",
    }
}
