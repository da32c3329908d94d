//! Coded enumerations shared by every DF-e layout

use crate::coded_enum;

coded_enum! {
    /// Ambiente de emissão (`tpAmb`)
    pub enum TipoAmbiente {
        /// Produção
        Producao = "1",
        /// Homologação
        Homologacao = "2",
    }
}

coded_enum! {
    /// Código de situação tributária do ICMS (`CST`/`CSOSN` groups)
    ///
    /// Partilha and repasse groups reuse the codes of the regular groups, so
    /// reading `"10"`, `"41"` or `"90"` back yields the regular member.
    pub enum IcmsCst {
        /// Tributada integralmente
        Cst00 = "00",
        /// Tributada e com cobrança do ICMS por substituição tributária
        Cst10 = "10",
        /// Com redução de base de cálculo
        Cst20 = "20",
        /// Isenta ou não tributada e com cobrança do ICMS por substituição tributária
        Cst30 = "30",
        /// Isenta
        Cst40 = "40",
        /// Não tributada
        Cst41 = "41",
        /// Suspensão
        Cst45 = "45",
        /// Suspensão
        Cst50 = "50",
        /// Diferimento
        Cst51 = "51",
        /// Cobrado anteriormente por substituição tributária
        Cst60 = "60",
        /// Com redução de base de cálculo e cobrança do ICMS por substituição tributária
        Cst70 = "70",
        /// Tributação pelo ICMS devido a outra UF
        Cst80 = "80",
        /// Tributação pelo ICMS devido a outra UF
        Cst81 = "81",
        /// Isento (CT-e)
        Cst90 = "90",
        /// Partilha entre UF de origem e destino, CST 10
        CstPart10 = "10",
        /// Partilha entre UF de origem e destino, CST 90
        CstPart90 = "90",
        /// Repasse de ICMS ST retido anteriormente
        CstRep41 = "41",
        /// ICMS devido à UF de origem da prestação (CT-e)
        CstICMSOutraUF = "90",
        /// Simples Nacional
        CstICMSSN = "SN",
    }
}
