//! Constants used in OTA and GlobalPlatform operations
//!
//! This module contains the class bytes, instruction codes, parameter values,
//! tags and status words used by ETSI TS 102 225/226, TS 31.111 and the
//! GlobalPlatform card specification.

use crate::transport::StatusWord;

/// Command classes
pub mod cla {
    /// ISO7816 command class
    pub const ISO7816: u8 = 0x00;
    /// GlobalPlatform command class
    pub const GP: u8 = 0x80;
    /// GSM 11.11 SIM command class, used for toolkit commands
    pub const SIM: u8 = 0xA0;
}

/// Instruction codes
pub mod ins {
    /// TERMINAL PROFILE command
    pub const TERMINAL_PROFILE: u8 = 0x10;
    /// FETCH command
    pub const FETCH: u8 = 0x12;
    /// TERMINAL RESPONSE command
    pub const TERMINAL_RESPONSE: u8 = 0x14;
    /// GET RESPONSE command
    pub const GET_RESPONSE: u8 = 0xC0;
    /// ENVELOPE command
    pub const ENVELOPE: u8 = 0xC2;
    /// DELETE command
    pub const DELETE: u8 = 0xE4;
    /// INSTALL command
    pub const INSTALL: u8 = 0xE6;
    /// LOAD command
    pub const LOAD: u8 = 0xE8;
    /// GET STATUS command
    pub const GET_STATUS: u8 = 0xF2;
}

/// Parameter values for INSTALL command (P1)
pub mod install_p1 {
    /// Install for load
    pub const FOR_LOAD: u8 = 0x02;
    /// Install for install
    pub const FOR_INSTALL: u8 = 0x04;
    /// Install for make selectable
    pub const FOR_MAKE_SELECTABLE: u8 = 0x08;
    /// Install for install and make selectable
    pub const FOR_INSTALL_AND_MAKE_SELECTABLE: u8 = FOR_INSTALL | FOR_MAKE_SELECTABLE;
}

/// Parameter values for LOAD command (P1)
pub mod load_p1 {
    /// More blocks to follow
    pub const MORE_BLOCKS: u8 = 0x00;
    /// Last block
    pub const LAST_BLOCK: u8 = 0x80;
}

/// Parameter values for GET STATUS command (P1)
pub mod get_status_p1 {
    /// Get status of issuer security domain
    pub const ISSUER_SECURITY_DOMAIN: u8 = 0x80;
    /// Get status of executable load files and modules
    pub const EXEC_LOAD_FILES_AND_MODULES: u8 = 0x10;
}

/// Parameter values for GET STATUS command (P2)
pub mod get_status_p2 {
    /// First or all occurrences
    pub const FIRST: u8 = 0x00;
    /// Next occurrence
    pub const NEXT: u8 = 0x01;
}

/// Parameter values for DELETE command (P2)
pub mod delete_p2 {
    /// Delete object
    pub const OBJECT: u8 = 0x00;
    /// Delete object and related objects
    pub const OBJECT_AND_RELATED: u8 = 0x80;
}

/// Commonly used status words
pub mod status {
    use super::StatusWord;

    /// Success
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// More data available (GET STATUS chaining)
    pub const MORE_DATA: StatusWord = StatusWord::new(0x63, 0x10);
    /// SW1: proactive command pending
    pub const PROACTIVE_COMMAND_PENDING: u8 = 0x91;
    /// SW1: SIM data download error, response data available
    pub const DOWNLOAD_ERROR: u8 = 0x9E;
    /// SW1: response data available
    pub const RESPONSE_AVAILABLE: u8 = 0x9F;
}

/// Tags used in GlobalPlatform commands
pub mod tags {
    /// AID tag for DELETE and GET STATUS
    pub const AID: u8 = 0x4F;
    /// Load file data block tag
    pub const LOAD_FILE_DATA_BLOCK: u8 = 0xC4;
    /// Non-volatile code space limit
    pub const CODE_SIZE: u8 = 0xC6;
    /// Volatile data space limit
    pub const VOLATILE_DATA_SIZE: u8 = 0xC7;
    /// Non-volatile data space limit
    pub const NON_VOLATILE_DATA_SIZE: u8 = 0xC8;
    /// Application specific parameters
    pub const APPLICATION_PARAMETERS: u8 = 0xC9;
    /// UICC toolkit application specific parameters
    pub const TOOLKIT_PARAMETERS: u8 = 0xCA;
    /// System specific parameters
    pub const SYSTEM_PARAMETERS: u8 = 0xEF;
}

/// BER-TLV tags used by the toolkit (TS 102 223 / TS 31.111)
pub mod toolkit {
    /// SMS-PP download envelope
    pub const SMS_PP_DOWNLOAD: u8 = 0xD1;
    /// Proactive command
    pub const PROACTIVE_COMMAND: u8 = 0xD0;
    /// Device identities (comprehension required)
    pub const DEVICE_IDENTITIES: u8 = 0x82;
    /// SMS TPDU (comprehension required)
    pub const SMS_TPDU: u8 = 0x8B;
    /// Command details (comprehension required)
    pub const COMMAND_DETAILS: u8 = 0x81;
    /// Result (comprehension required)
    pub const RESULT: u8 = 0x83;
    /// Comprehension-required flag on simple TLV tags
    pub const COMPREHENSION_REQUIRED: u8 = 0x80;

    /// Device identity: network
    pub const DEVICE_NETWORK: u8 = 0x83;
    /// Device identity: UICC
    pub const DEVICE_UICC: u8 = 0x81;
    /// Device identity: terminal (ME)
    pub const DEVICE_TERMINAL: u8 = 0x82;

    /// General result: command beyond terminal's capabilities
    pub const RESULT_BEYOND_TERMINAL_CAPABILITY: u8 = 0x30;
}

/// Type of command values in proactive Command Details (TS 102 223)
pub mod command_type {
    /// MORE TIME
    pub const MORE_TIME: u8 = 0x02;
    /// POLL INTERVAL
    pub const POLL_INTERVAL: u8 = 0x03;
    /// SET UP EVENT LIST
    pub const SET_UP_EVENT_LIST: u8 = 0x05;
    /// SEND SHORT MESSAGE
    pub const SEND_SHORT_MESSAGE: u8 = 0x13;
    /// LAUNCH BROWSER
    pub const LAUNCH_BROWSER: u8 = 0x15;
    /// DISPLAY TEXT
    pub const DISPLAY_TEXT: u8 = 0x21;
    /// SET UP MENU
    pub const SET_UP_MENU: u8 = 0x25;
    /// PROVIDE LOCAL INFORMATION
    pub const PROVIDE_LOCAL_INFORMATION: u8 = 0x26;
}

/// Toolkit Application References of the on-card OTA targets
pub mod tar {
    /// Remote Applet Management (card manager)
    pub const RAM: [u8; 3] = [0x00, 0x00, 0x00];
    /// Remote File Management, SIM file system
    pub const RFM_SIM: [u8; 3] = [0xB0, 0x00, 0x10];
    /// Remote File Management, USIM file system
    pub const RFM_USIM: [u8; 3] = [0xB0, 0x00, 0x11];
}

/// SMS TPDU framing (3GPP TS 23.040 / TS 31.115)
pub mod sms {
    /// SMS-DELIVER header used for envelopes: MTI deliver with UDHI,
    /// originating address 55667788 (TON/NPI 81), PID SIM data download,
    /// DCS 8-bit class 2, and a fixed service centre timestamp
    pub const DELIVER_HEADER: [u8; 16] = [
        0x40, 0x08, 0x81, 0x55, 0x66, 0x77, 0x88, 0x7F, 0xF6, 0x00, 0x11, 0x29, 0x12, 0x00, 0x00,
        0x04,
    ];
    /// First octet of the SMS-SUBMIT carrying a proof of receipt
    pub const SUBMIT_WITH_UDH: u8 = 0x41;
    /// Command packet identifier information element
    pub const IEI_COMMAND_PACKET: u8 = 0x70;
    /// Response packet identifier information element
    pub const IEI_RESPONSE_PACKET: u8 = 0x71;
    /// Concatenated short message, 8-bit reference
    pub const IEI_CONCATENATED_8BIT: u8 = 0x00;
    /// Concatenated short message, 16-bit reference
    pub const IEI_CONCATENATED_16BIT: u8 = 0x08;
    /// UDH length of a bare concatenation header
    pub const MINIMAL_UDH_LENGTH: u8 = 5;
}

/// Algorithm identifier for triple DES in outer-CBC mode with two keys
pub const ALGORITHM_TDES_2KEY: u8 = 0x05;

/// Second SPI byte: proof of receipt required
pub const SPI_POR_REQUIRED: u8 = 0x01;

/// Minimum security level: cryptographic checksum with ciphering
pub const MSL_CC_CIPHERED: u8 = 0x06;

/// Minimum security level: no security
pub const MSL_NONE: u8 = 0x00;

/// Terminal profile sent after power-up
pub const TERMINAL_PROFILE: [u8; 17] = [
    0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];
