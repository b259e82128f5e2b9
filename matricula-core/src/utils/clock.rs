use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Current wall-clock time as the offset-less type the database columns use.
pub fn now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Shift a gateway timestamp to UTC and strip the offset.
pub fn to_primitive_utc(moment: OffsetDateTime) -> PrimitiveDateTime {
    let utc = moment.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}
