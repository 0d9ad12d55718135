// Generated by sqlbake: 2 queries in 1 buckets.
#[allow(unused_variables)]
fn execute_compiled_sql_de089b8b(sql: &str, program: &mut Vec<VdbeOp>) -> bool {
    if sql == "SELECT 162789" {
        program.extend_from_slice(&[
            VdbeOp::new("Init", 0, 3, 0, 0),
            VdbeOp::new("String8", 0, 1, 0, 0).with_text("a \"quoted\" value"),
            VdbeOp::new("ResultRow", 1, 1, 0, 0),
        ]);
        return true;
    }
    if sql == "SELECT 379192" {
        program.extend_from_slice(&[
            VdbeOp::new("Integer", 7, 1, 0, 0),
            VdbeOp::new("OpenRead", 0, 2, 0, 0).with_int(2),
            VdbeOp::new("Halt", 0, 0, 0, 1),
        ]);
        return true;
    }
    false
}

pub fn execute_compiled_sql(sql: &str, program: &mut Vec<VdbeOp>) -> bool {
    let mut h: u32 = 0;
    for &b in sql.as_bytes() {
        h ^= u32::from(b);
        h = h
            .wrapping_add(h << 1)
            .wrapping_add(h << 4)
            .wrapping_add(h << 7)
            .wrapping_add(h << 8)
            .wrapping_add(h << 24);
    }
    match h {
        0xde089b8b => execute_compiled_sql_de089b8b(sql, program),
        _ => false,
    }
}
