//! Command ids for the frame protocol.
//!
//! 1800..1899 animal game, 1900..1999 slot game, 2000..2099 config surface,
//! 1002 generic heartbeat. Request/response pairs reuse one id; pushes have
//! their own ids and carry `Flag = 0`.

// Generic
pub const HEARTBEAT: u16 = 1002;

// Animal game: request/response
pub const ANIMAL_ENTER_ROOM: u16 = 1801;
pub const ANIMAL_LEAVE_ROOM: u16 = 1802;
pub const ANIMAL_BET: u16 = 1803;
pub const ANIMAL_RECORD: u16 = 1804;
pub const ANIMAL_RECENT_REWARDS: u16 = 1805;
pub const ANIMAL_USE_SKILL: u16 = 1806;
pub const ANIMAL_ROOM_LIST: u16 = 1807;
pub const ANIMAL_BUY_TOOL: u16 = 1808;
pub const ANIMAL_TOOL_PRICE: u16 = 1809;
pub const ANIMAL_JACKPOT_HISTORY: u16 = 1812;
pub const ANIMAL_FIRE_BULLET: u16 = 1815;

// Animal game: pushes
pub const PUSH_JACKPOT_AMOUNT: u16 = 1810;
pub const PUSH_JACKPOT_WIN: u16 = 1811;
pub const PUSH_SKILL_USED: u16 = 1882;
pub const PUSH_ANIMAL_COMING: u16 = 1883;
pub const PUSH_ANIMAL_DIED: u16 = 1884;
pub const PUSH_PLAYER_LEFT: u16 = 1885;
pub const PUSH_PLAYER_ENTERED: u16 = 1886;
pub const PUSH_ANIMAL_ENTERED: u16 = 1887;
pub const PUSH_ANIMAL_LEFT: u16 = 1888;
pub const PUSH_PLAYER_HIT: u16 = 1899;

// Slot game
pub const SLOT_ENTER: u16 = 1901;
pub const SLOT_START: u16 = 1902;
pub const PUSH_SLOT_JACKPOT: u16 = 1910;

// Config surface
pub const CONFIG_SERVER_INFO: u16 = 2001;
pub const CONFIG_CLIENT_ERROR: u16 = 2002;
pub const CONFIG_HEARTBEAT: u16 = 2099;

/// Inclusive id range handled by the animal game.
pub const ANIMAL_RANGE: (u16, u16) = (1800, 1899);
/// Inclusive id range handled by the slot game.
pub const SLOT_RANGE: (u16, u16) = (1900, 1999);
/// Inclusive id range handled by the config surface.
pub const CONFIG_RANGE: (u16, u16) = (2000, 2099);
