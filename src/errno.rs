// 补丁操作错误码，0 表示成功
#[repr(i32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Errno {
    Ok = 0,           // 成功
    NoDynamic = 1,    // 未找到 PT_DYNAMIC 段
    BadDynamic = 2,   // dynamic section 缺少必需的表
    NoSym = 3,        // 符号未找到或不符合 binding/type 要求
    BadRelocType = 4, // 重定位类型不是本架构的 jump-slot
    GetProt = 5,      // 读取内存保护属性失败
    SetProt = 6,      // 设置内存保护属性失败
    BadMaps = 7,      // /proc/self/maps 解析失败
    Format = 8,       // ELF 元数据格式异常
    Invalid = 9,      // 参数无效
}

impl Errno {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<Errno> for i32 {
    fn from(value: Errno) -> Self {
        value as i32
    }
}
