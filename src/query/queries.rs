// region:    --- Users
/// 사용자 생성
pub const INSERT_USER: &str = "INSERT INTO users (username, team_name, wallet, active) VALUES ($1, $2, $3, TRUE) RETURNING id, username, team_name, wallet, active";

/// 사용자 조회
pub const GET_USER: &str = "SELECT id, username, team_name, wallet, active FROM users WHERE id = $1";

/// 모든 사용자 조회
pub const LIST_USERS: &str = "SELECT id, username, team_name, wallet, active FROM users ORDER BY id";

/// 사용자 활성 상태 변경
pub const SET_USER_ACTIVE: &str = "UPDATE users SET active = $1 WHERE id = $2 RETURNING id, username, team_name, wallet, active";

/// 지갑 잔액 조회
pub const GET_USER_WALLET: &str = "SELECT wallet FROM users WHERE id = $1";

/// 조건부 지갑 차감. 잔액이 부족하면 행이 반환되지 않는다.
pub const DEBIT_WALLET: &str =
    "UPDATE users SET wallet = wallet - $1 WHERE id = $2 AND wallet >= $1 RETURNING wallet";
// endregion: --- Users

// region:    --- Questions
pub const INSERT_QUESTION: &str = r#"
    INSERT INTO questions (title, difficulty, description, starter_code, tags, test_cases)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING id, title, difficulty, description, starter_code, tags, test_cases
"#;

pub const UPDATE_QUESTION: &str = r#"
    UPDATE questions
    SET title = $1, difficulty = $2, description = $3, starter_code = $4, tags = $5, test_cases = $6
    WHERE id = $7
    RETURNING id, title, difficulty, description, starter_code, tags, test_cases
"#;

pub const DELETE_QUESTION: &str = "DELETE FROM questions WHERE id = $1";

pub const GET_QUESTION: &str = "SELECT id, title, difficulty, description, starter_code, tags, test_cases FROM questions WHERE id = $1";

pub const LIST_QUESTIONS: &str = "SELECT id, title, difficulty, description, starter_code, tags, test_cases FROM questions ORDER BY id";
// endregion: --- Questions

// region:    --- Sessions
pub const INSERT_SESSION: &str = r#"
    INSERT INTO auction_sessions (kind, auction_id, phase)
    VALUES ($1, $2, 'idle')
    RETURNING id, kind, auction_id, phase, current_question_id, current_bid, deadline
"#;

pub const UPDATE_SESSION: &str = r#"
    UPDATE auction_sessions
    SET phase = $1, current_question_id = $2, current_bid = $3, deadline = $4
    WHERE id = $5
"#;

pub const GET_SESSION: &str = "SELECT id, kind, auction_id, phase, current_question_id, current_bid, deadline FROM auction_sessions WHERE id = $1";
// endregion: --- Sessions

// region:    --- Bids
/// 입찰 기록 추가
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (session_id, round_question_id, user_id, amount, accepted_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, session_id, round_question_id, user_id, amount, accepted_at
"#;

/// 세션 입찰 이력 조회
pub const LIST_BIDS: &str = r#"
    SELECT id, session_id, round_question_id, user_id, amount, accepted_at
    FROM bids
    WHERE session_id = $1
    ORDER BY accepted_at, id
"#;
// endregion: --- Bids

// region:    --- Allotments
pub const FIND_ALLOTMENT: &str = "SELECT id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed FROM allotted_questions WHERE session_id = $1 AND user_id = $2 AND question_id = $3";

pub const FIND_ALLOTMENT_FOR_QUESTION: &str = "SELECT id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed FROM allotted_questions WHERE session_id = $1 AND question_id = $2";

pub const INSERT_ALLOTMENT: &str = r#"
    INSERT INTO allotted_questions (session_id, user_id, question_id, bid_amount, status, total_test_cases)
    VALUES ($1, $2, $3, $4, 'allotted', $5)
    RETURNING id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed
"#;

pub const GET_ALLOTMENT: &str = "SELECT id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed FROM allotted_questions WHERE id = $1";

pub const UPDATE_ALLOTMENT: &str = r#"
    UPDATE allotted_questions
    SET status = $1, score = $2, test_cases_passed = $3, total_test_cases = $4, judge_failed = $5
    WHERE id = $6
"#;

pub const LIST_SESSION_ALLOTMENTS: &str = "SELECT id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed FROM allotted_questions WHERE session_id = $1 ORDER BY id";

pub const LIST_USER_ALLOTMENTS: &str = "SELECT id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed FROM allotted_questions WHERE user_id = $1 ORDER BY id";

pub const LIST_ALLOTMENTS: &str = "SELECT id, session_id, user_id, question_id, bid_amount, status, score, test_cases_passed, total_test_cases, judge_failed FROM allotted_questions ORDER BY id";
// endregion: --- Allotments

// region:    --- Scheduled Auctions
pub const INSERT_SCHEDULED: &str = r#"
    INSERT INTO scheduled_auctions
        (title, description, scheduled_time, questions, min_users, max_users, auction_duration, coding_duration, joined_users, status, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{}', 'scheduled', NOW())
    RETURNING id, title, description, scheduled_time, questions, min_users, max_users, auction_duration, coding_duration, joined_users, status, created_at
"#;

pub const GET_SCHEDULED: &str = "SELECT id, title, description, scheduled_time, questions, min_users, max_users, auction_duration, coding_duration, joined_users, status, created_at FROM scheduled_auctions WHERE id = $1";

pub const LIST_SCHEDULED: &str = "SELECT id, title, description, scheduled_time, questions, min_users, max_users, auction_duration, coding_duration, joined_users, status, created_at FROM scheduled_auctions ORDER BY scheduled_time";

pub const UPDATE_SCHEDULED: &str = r#"
    UPDATE scheduled_auctions
    SET title = $1, description = $2, scheduled_time = $3, questions = $4, min_users = $5,
        max_users = $6, auction_duration = $7, coding_duration = $8, joined_users = $9, status = $10
    WHERE id = $11
"#;

pub const DELETE_SCHEDULED: &str = "DELETE FROM scheduled_auctions WHERE id = $1";
// endregion: --- Scheduled Auctions
