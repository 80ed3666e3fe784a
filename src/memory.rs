// 内存页面保护属性的读取与修改，通过解析 /proc/self/maps 获取当前权限

use crate::errno::Errno;
use crate::log;
use once_cell::sync::OnceCell;
use std::fs::File;
use std::io::{BufRead, BufReader};

pub const PROT_READ_FLAG: u32 = 0x1;
pub const PROT_WRITE_FLAG: u32 = 0x2;
pub const PROT_EXEC_FLAG: u32 = 0x4;

// 查询指定地址范围的内存保护属性
// pathname 可选，用于加速 maps 行过滤；不匹配时回退纯地址查找
pub fn get_mem_protect(addr: usize, len: usize, pathname: Option<&str>) -> Result<u32, Errno> {
    if pathname.is_some()
        && let Ok(prot) = scan_maps_for_protect(addr, len, pathname)
    {
        return Ok(prot);
    }
    scan_maps_for_protect(addr, len, None)
}

// 逐行扫描 /proc/self/maps，收集覆盖 [addr, addr+len) 的所有段的权限
// 跨段时取权限交集；仅匹配私有映射（perm[3] == 'p'）
fn scan_maps_for_protect(addr: usize, len: usize, pathname: Option<&str>) -> Result<u32, Errno> {
    let mut start_addr = addr;
    let end_addr = addr.saturating_add(len);
    let mut prot: u32 = 0;
    let mut load0 = true;
    let mut found_all = false;

    let file = File::open("/proc/self/maps").map_err(|_| Errno::BadMaps)?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line.map_err(|_| Errno::BadMaps)?;
        if let Some(path) = pathname
            && !line.contains(path)
        {
            continue;
        }

        let mut parts = line.split_whitespace();
        let range = match parts.next() {
            Some(value) => value,
            None => continue,
        };
        let perm = match parts.next() {
            Some(value) => value,
            None => continue,
        };

        if perm.len() < 4 {
            continue;
        }
        let perm_bytes = perm.as_bytes();
        if perm_bytes[3] != b'p' {
            continue;
        }

        let mut range_parts = range.split('-');
        let start_str = match range_parts.next() {
            Some(value) => value,
            None => continue,
        };
        let end_str = match range_parts.next() {
            Some(value) => value,
            None => continue,
        };
        let start = usize::from_str_radix(start_str, 16).unwrap_or(0);
        let end = usize::from_str_radix(end_str, 16).unwrap_or(0);

        if start_addr < start || start_addr >= end {
            continue;
        }

        if load0 {
            if perm_bytes[0] == b'r' {
                prot |= PROT_READ_FLAG;
            }
            if perm_bytes[1] == b'w' {
                prot |= PROT_WRITE_FLAG;
            }
            if perm_bytes[2] == b'x' {
                prot |= PROT_EXEC_FLAG;
            }
            load0 = false;
        } else {
            if perm_bytes[0] != b'r' {
                prot &= !PROT_READ_FLAG;
            }
            if perm_bytes[1] != b'w' {
                prot &= !PROT_WRITE_FLAG;
            }
            if perm_bytes[2] != b'x' {
                prot &= !PROT_EXEC_FLAG;
            }
        }

        if end_addr <= end {
            found_all = true;
            break;
        }
        start_addr = end;
    }

    if !found_all {
        return Err(Errno::GetProt);
    }

    Ok(prot)
}

// 修改覆盖 [addr, addr+len) 的整页范围的保护属性
pub fn set_mem_protect(addr: usize, len: usize, prot: u32) -> Result<(), Errno> {
    let (start, aligned_len) = page_bounds(addr, len);
    let result = unsafe { libc::mprotect(start as *mut libc::c_void, aligned_len, prot as i32) };
    if result != 0 {
        let err = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        log::error(format_args!("mprotect failed: {err}"));
        return Err(Errno::SetProt);
    }
    Ok(())
}

fn page_size() -> usize {
    static PAGE_SIZE: OnceCell<usize> = OnceCell::new();
    *PAGE_SIZE.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}

// 计算覆盖 [addr, addr+len) 的页对齐起始地址和整页长度
fn page_bounds(addr: usize, len: usize) -> (usize, usize) {
    let page_size = page_size();
    if page_size == 0 {
        return (addr, len);
    }
    let page_mask = !(page_size - 1);
    let start = addr & page_mask;
    let end = (addr + len.max(1) - 1) & page_mask;
    let end = end + page_size;
    (start, end - start)
}

// 作用域保护守卫：构造时赋予目标范围读写权限，restore/析构时恢复原有属性
// 原属性已含写权限时不做任何 mprotect 调用
pub struct ProtGuard {
    addr: usize,
    len: usize,
    old_prot: u32,
    changed: bool,
}

impl ProtGuard {
    pub unsafe fn writable(addr: usize, len: usize, pathname: Option<&str>) -> Result<Self, Errno> {
        if addr == 0 || len == 0 {
            return Err(Errno::Invalid);
        }

        let old_prot = get_mem_protect(addr, len, pathname)?;
        let need_prot = PROT_READ_FLAG | PROT_WRITE_FLAG;
        let mut changed = false;
        if old_prot != need_prot {
            set_mem_protect(addr, len, need_prot)?;
            changed = true;
        }

        Ok(Self {
            addr,
            len,
            old_prot,
            changed,
        })
    }

    // 显式恢复原有保护属性；写入方成功上报前必须走这里拿到恢复结果
    pub fn restore(mut self) -> Result<(), Errno> {
        if !self.changed {
            return Ok(());
        }
        self.changed = false;
        set_mem_protect(self.addr, self.len, self.old_prot)
    }
}

// 兜底：未显式 restore（如提前返回）时在析构中恢复，失败只能告警
impl Drop for ProtGuard {
    fn drop(&mut self) {
        if self.changed
            && let Err(err) = set_mem_protect(self.addr, self.len, self.old_prot)
        {
            log::warn(format_args!("restore mem prot failed: {:?}", err));
        }
    }
}
