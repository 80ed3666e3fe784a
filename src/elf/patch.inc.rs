// 符号查找、符号禁用与 PLT 重定位改写，通过 include! 嵌入 elf.rs

impl DynamicState {
    // 通过 DT_HASH 的 bucket/chain 链表查找符号，返回首个同名条目的索引
    pub(crate) fn find_symidx_by_name(&self, symbol: &str) -> Result<u32, Errno> {
        if self.bucket_cnt == 0 {
            return Err(Errno::NoSym);
        }
        let hash = elf_hash(symbol.as_bytes());
        let mut i = unsafe { *self.bucket.add((hash % self.bucket_cnt) as usize) };
        let mut steps: u32 = 0;
        while i != 0 {
            // 索引越过 nchain 或链表成环说明表已损坏，放弃查找
            if i >= self.chain_cnt || steps >= self.chain_cnt {
                return Err(Errno::Format);
            }
            if let Some(name) = unsafe { self.sym_name(i) }
                && name == symbol
            {
                log::debug(format_args!("found {} at symidx: {}", symbol, i));
                return Ok(i);
            }
            i = unsafe { *self.chain.add(i as usize) };
            steps += 1;
        }
        Err(Errno::NoSym)
    }

    // 通过符号索引从 strtab 获取符号名
    unsafe fn sym_name(&self, idx: u32) -> Option<&str> {
        if self.symtab.is_null() || self.strtab.is_null() {
            return None;
        }
        if self.chain_cnt != 0 && idx >= self.chain_cnt {
            return None;
        }
        let sym = &*self.symtab.add(idx as usize);
        let name_ptr = self.strtab.add(sym.st_name as usize);
        let cstr = CStr::from_ptr(name_ptr);
        cstr.to_str().ok()
    }

    // 将符号名前 3 字节覆写为哨兵值，使按名解析从此失效；不可逆
    pub(crate) unsafe fn disable_symbol(&self, symbol: &str) -> Result<(), Errno> {
        if symbol.is_empty() {
            return Err(Errno::Invalid);
        }

        let hash = elf_hash(symbol.as_bytes());
        let symidx = match self.find_symidx_by_name(symbol) {
            Ok(value) => value,
            Err(err) => {
                log::warn(format_args!(
                    "could not find symbol {} to disable (hash: {:#x})",
                    symbol, hash
                ));
                return Err(err);
            }
        };

        let sym = &*self.symtab.add(symidx as usize);
        // 参照行为：首个同名条目 binding/type 不合格即按未找到处理，不再沿链扫描
        if elf_st_bind(sym.st_info) != STB_GLOBAL || elf_st_type(sym.st_info) != STT_FUNC {
            log::warn(format_args!(
                "symbol {} is not a global function, not disabling (hash: {:#x})",
                symbol, hash
            ));
            return Err(Errno::NoSym);
        }

        let name_addr = self.strtab.add(sym.st_name as usize) as usize;
        log::debug(format_args!(
            "disabling symbol {} at {:#x}",
            symbol, name_addr
        ));

        let guard = ProtGuard::writable(name_addr, SYMBOL_PATCH_VALUE.len(), Some(&self.pathname))?;
        ptr::copy_nonoverlapping(
            SYMBOL_PATCH_VALUE.as_ptr(),
            name_addr as *mut u8,
            SYMBOL_PATCH_VALUE.len(),
        );
        // 恢复失败同样算目标失败，写入已发生但页面被留在可写状态
        guard.restore()?;
        Ok(())
    }

    // 遍历 PLT 重定位表，将命中目标符号的 jump-slot 改写为替换函数地址
    // 单条失败只标记对应目标，不中断其余条目的处理
    pub(crate) unsafe fn patch_plt_relocs(&self, redirects: &[Redirect]) -> Vec<TargetOutcome> {
        let mut outcomes: Vec<TargetOutcome> = redirects
            .iter()
            .map(|redirect| TargetOutcome {
                sym_name: redirect.sym_name.to_string(),
                errno: Errno::Ok,
            })
            .collect();

        if self.relplt == 0 || redirects.is_empty() {
            return outcomes;
        }

        if self.is_use_rela {
            let relplt_cnt = self.relplt_sz / mem::size_of::<ElfRela>();
            let relas = slice::from_raw_parts(self.relplt as *const ElfRela, relplt_cnt);
            for rela in relas {
                self.patch_one(
                    redirects,
                    &mut outcomes,
                    rela.r_offset as usize,
                    rela.r_info,
                    rela.r_addend as i64,
                );
            }
        } else {
            let relplt_cnt = self.relplt_sz / mem::size_of::<ElfRel>();
            let rels = slice::from_raw_parts(self.relplt as *const ElfRel, relplt_cnt);
            for rel in rels {
                self.patch_one(redirects, &mut outcomes, rel.r_offset as usize, rel.r_info, 0);
            }
        }

        outcomes
    }

    // 匹配单条重定位：符号名命中目标且类型为 jump-slot 时改写对应 slot
    unsafe fn patch_one(
        &self,
        redirects: &[Redirect],
        outcomes: &mut [TargetOutcome],
        r_offset: usize,
        r_info: ElfXword,
        r_addend: i64,
    ) {
        let r_sym = elf_r_sym(r_info);
        if r_sym == 0 {
            return;
        }
        let Some(name) = self.sym_name(r_sym) else {
            return;
        };
        let Some(pos) = redirects.iter().position(|r| r.sym_name == name) else {
            return;
        };

        let r_type = elf_r_type(r_info);
        if r_type != R_GENERIC_JUMP_SLOT {
            log::warn(format_args!(
                "asked to patch unsupported reloc type {:#x} for {}",
                r_type, name
            ));
            outcomes[pos].errno = Errno::BadRelocType;
            return;
        }

        let addr = self.base_addr + r_offset;
        // reloc = S + A；REL 编码没有 addend，传入 0
        let value = (redirects[pos].new_func as usize).wrapping_add(r_addend as usize);
        log::debug(format_args!(
            "patching relocation at {:#x} (offset={:#x}) -> {:#x}",
            addr, r_offset, value
        ));

        match ProtGuard::writable(addr, mem::size_of::<usize>(), Some(&self.pathname)) {
            Ok(guard) => {
                ptr::write(addr as *mut usize, value);
                // 两次保护切换加写入全部成功才算目标成功
                if let Err(err) = guard.restore() {
                    outcomes[pos].errno = err;
                }
            }
            Err(err) => outcomes[pos].errno = err,
        }
    }
}
